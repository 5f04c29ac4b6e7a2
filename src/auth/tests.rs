use super::*;
use axum::http::HeaderMap;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().unwrap());
    headers
}

#[cfg(test)]
mod extract_bearer_token_tests {
    use super::*;

    #[test]
    fn valid_bearer_token() {
        let headers = headers_with("Bearer driver-7f3a");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "driver-7f3a");
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        let headers = headers_with("Bearer   driver-7f3a  ");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "driver-7f3a");
    }

    #[test]
    fn case_insensitive_scheme() {
        let headers = headers_with("bearer driver-7f3a");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "driver-7f3a");
    }

    #[test]
    fn missing_authorization_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), Err(TokenError::Missing));
    }

    #[test]
    fn missing_bearer_prefix() {
        let headers = headers_with("driver-7f3a");
        assert_eq!(extract_bearer_token(&headers), Err(TokenError::InvalidFormat));
    }

    #[test]
    fn wrong_auth_scheme() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer_token(&headers), Err(TokenError::InvalidFormat));
    }

    #[test]
    fn bearer_with_blank_token() {
        let headers = headers_with("Bearer    ");
        assert_eq!(extract_bearer_token(&headers), Err(TokenError::Empty));
    }
}

#[cfg(test)]
mod extract_stream_token_tests {
    use super::*;

    #[test]
    fn query_token_preferred() {
        let headers = headers_with("Bearer from-header");
        assert_eq!(
            extract_stream_token(&headers, Some("from-query")).unwrap(),
            "from-query"
        );
    }

    #[test]
    fn falls_back_to_header() {
        let headers = headers_with("Bearer from-header");
        assert_eq!(extract_stream_token(&headers, None).unwrap(), "from-header");
    }

    #[test]
    fn empty_query_token() {
        assert_eq!(
            extract_stream_token(&HeaderMap::new(), Some("  ")),
            Err(TokenError::Empty)
        );
    }

    #[test]
    fn nothing_presented() {
        assert_eq!(
            extract_stream_token(&HeaderMap::new(), None),
            Err(TokenError::Missing)
        );
    }
}

#[cfg(test)]
mod gate_tests {
    use super::*;

    struct ReadOnlyVerifier;

    #[async_trait]
    impl TokenVerifier for ReadOnlyVerifier {
        async fn verify(&self, token: &str) -> Verification {
            match token {
                "rider" => Verification::Allowed,
                "suspended" => Verification::Forbidden,
                _ => Verification::Rejected,
            }
        }
    }

    #[tokio::test]
    async fn disabled_gate_allows_everything() {
        let gate = AuthGate::disabled();
        assert!(!gate.is_enabled());
        assert!(gate.authorize(Err(TokenError::Missing)).await.is_ok());
    }

    #[tokio::test]
    async fn static_verifier() {
        let verifier = StaticTokenVerifier::new(["alpha", "beta"]);
        assert_eq!(verifier.verify("alpha").await, Verification::Allowed);
        assert_eq!(verifier.verify("gamma").await, Verification::Rejected);
    }

    #[tokio::test]
    async fn gate_from_config() {
        let config = AuthConfig {
            enabled: true,
            tokens: vec!["alpha".to_string()],
        };
        let gate = AuthGate::from_config(&config);
        assert!(gate.is_enabled());
        assert!(gate.authorize(Ok("alpha".to_string())).await.is_ok());
        assert!(matches!(
            gate.authorize(Ok("other".to_string())).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let gate = AuthGate::new(Arc::new(ReadOnlyVerifier));
        let err = gate.authorize(Err(TokenError::Missing)).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::Unauthorized("Authorization token not provided".to_string())
        );
    }

    #[tokio::test]
    async fn forbidden_token() {
        let gate = AuthGate::new(Arc::new(ReadOnlyVerifier));
        assert!(matches!(
            gate.authorize(Ok("suspended".to_string())).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(gate.authorize(Ok("rider".to_string())).await.is_ok());
    }

    #[test]
    fn auth_error_status_codes() {
        let response = AuthError::Unauthorized("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::Forbidden("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

#[cfg(test)]
mod token_error_display_tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            TokenError::Missing.to_string(),
            "Authorization token not provided"
        );
        assert_eq!(
            TokenError::InvalidFormat.to_string(),
            "Invalid authorization token format"
        );
        assert_eq!(TokenError::Empty.to_string(), "Authorization token is empty");
    }
}
