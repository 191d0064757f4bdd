//! End-to-end tests for the login flow.

#[cfg(test)]
mod integration_tests {
    use crate::{
        BackendExchanger, BrowserLauncher, Credential, EXCHANGE_PATH, LoginConfig, LoginFlow,
        OAuth2Error, PrintOnly,
    };
    use cmdref_identity_session::{FileSessionStore, InMemorySessionStore, SessionStore};
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// What the fake browser does with the authorization URL.
    #[derive(Clone)]
    enum Script {
        Approve(&'static str),
        Deny(&'static str, &'static str),
        ForgeState(usize),
        DoubleApprove(&'static str, &'static str),
        Ignore,
    }

    /// Stands in for the user's browser: reads the authorization URL and hits
    /// the loopback redirect the way the provider would.
    struct ScriptedBrowser {
        script: Script,
        opened: Mutex<Option<Url>>,
    }

    impl ScriptedBrowser {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                opened: Mutex::new(None),
            })
        }

        fn opened_url(&self) -> Url {
            self.opened.lock().unwrap().clone().expect("browser was never opened")
        }

        fn redirect_uri(&self) -> Url {
            let params = query_map(&self.opened_url());
            Url::parse(&params["redirect_uri"]).unwrap()
        }
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    fn loopback_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    impl BrowserLauncher for ScriptedBrowser {
        fn open(&self, url: &str) -> io::Result<()> {
            let url = Url::parse(url).map_err(io::Error::other)?;
            *self.opened.lock().unwrap() = Some(url.clone());

            let params = query_map(&url);
            let redirect = params["redirect_uri"].clone();
            let state = params["state"].clone();
            let script = self.script.clone();

            tokio::spawn(async move {
                let client = loopback_client();
                match script {
                    Script::Approve(code) => {
                        let _ = client
                            .get(format!("{}?state={}&code={}", redirect, state, code))
                            .send()
                            .await;
                    }
                    Script::Deny(error, description) => {
                        let _ = client
                            .get(&redirect)
                            .query(&[
                                ("state", state.as_str()),
                                ("error", error),
                                ("error_description", description),
                            ])
                            .send()
                            .await;
                    }
                    Script::ForgeState(count) => {
                        let requests = (0..count).map(|i| {
                            client
                                .get(format!("{}?state=forged-{}&code=EVIL{}", redirect, i, i))
                                .send()
                        });
                        let _ = futures::future::join_all(requests).await;
                    }
                    Script::DoubleApprove(first, second) => {
                        let a = client
                            .get(format!("{}?state={}&code={}", redirect, state, first))
                            .send();
                        let b = client
                            .get(format!("{}?state={}&code={}", redirect, state, second))
                            .send();
                        let _ = tokio::join!(a, b);
                    }
                    Script::Ignore => {}
                }
            });

            Ok(())
        }
    }

    struct BrokenBrowser;

    impl BrowserLauncher for BrokenBrowser {
        fn open(&self, _url: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no browser here"))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    async fn mock_backend(token: &str, email: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EXCHANGE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "token": token, "email": email })),
            )
            .mount(&server)
            .await;
        server
    }

    fn login_flow(
        backend: &MockServer,
        sessions: Arc<dyn SessionStore>,
        browser: Arc<dyn BrowserLauncher>,
        timeout: Duration,
    ) -> LoginFlow {
        let config = LoginConfig::google("test-client").with_timeout(timeout);
        let exchanger = BackendExchanger::new(&backend.uri(), Duration::from_secs(5)).unwrap();
        LoginFlow::new(config, Arc::new(exchanger), sessions).with_browser(browser)
    }

    async fn port_is_closed(redirect: &Url) -> bool {
        let addr = format!(
            "{}:{}",
            redirect.host_str().unwrap(),
            redirect.port().unwrap()
        );
        tokio::net::TcpStream::connect(addr).await.is_err()
    }

    #[tokio::test]
    async fn test_full_login_flow_persists_session() {
        init_tracing();
        let backend = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(EXCHANGE_PATH))
            .and(body_partial_json(serde_json::json!({ "code": "CODE1" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "t1", "email": "a@b.com"})),
            )
            .expect(1)
            .mount(&backend)
            .await;

        let dir = TempDir::new().unwrap();
        let sessions = Arc::new(FileSessionStore::in_dir(dir.path()));
        let browser = ScriptedBrowser::new(Script::Approve("CODE1"));

        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_secs(10),
        );
        let credential = flow.run().await.unwrap();

        assert_eq!(credential.token, "t1");
        assert_eq!(credential.email, "a@b.com");
        assert!(credential.created_at.is_some());

        let stored = sessions.load().unwrap().unwrap();
        assert_eq!(stored.token, "t1");
        assert_eq!(stored, credential);

        // The verifier sent to the backend must match the challenge the browser saw
        let requests = backend.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let params = query_map(&browser.opened_url());
        assert_eq!(
            crate::code_challenge(body["code_verifier"].as_str().unwrap()),
            params["code_challenge"]
        );
        assert_eq!(body["redirect_uri"].as_str().unwrap(), params["redirect_uri"]);

        assert!(port_is_closed(&browser.redirect_uri()).await);
        backend.verify().await;
    }

    #[tokio::test]
    async fn test_provider_denial_fails_without_exchange() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&backend)
            .await;

        let sessions = Arc::new(InMemorySessionStore::new());
        let browser = ScriptedBrowser::new(Script::Deny("access_denied", "The user denied access"));
        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_secs(10),
        );

        match flow.run().await {
            Err(OAuth2Error::Authorization { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "The user denied access");
            }
            other => panic!("Expected authorization error, got {:?}", other),
        }

        assert!(sessions.load().unwrap().is_none());
        assert!(port_is_closed(&browser.redirect_uri()).await);
        backend.verify().await;
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let backend = mock_backend("t1", "a@b.com").await;
        let sessions = Arc::new(InMemorySessionStore::new());
        let browser = ScriptedBrowser::new(Script::Ignore);
        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_millis(300),
        );

        let result = flow.run().await;
        match result {
            Err(OAuth2Error::Timeout(waited)) => {
                assert_eq!(waited, Duration::from_millis(300));
            }
            other => panic!("Expected timeout, got {:?}", other),
        }

        let message = OAuth2Error::Timeout(Duration::from_secs(180)).to_string();
        assert!(message.contains("180s"));
        assert!(message.contains("run login again"));

        assert!(sessions.load().unwrap().is_none());
        assert!(port_is_closed(&browser.redirect_uri()).await);
    }

    #[tokio::test]
    async fn test_forged_state_never_reaches_orchestrator() {
        for forged in [1usize, 100] {
            let backend = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(EXCHANGE_PATH))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&backend)
                .await;

            let sessions = Arc::new(InMemorySessionStore::new());
            let browser = ScriptedBrowser::new(Script::ForgeState(forged));
            let flow = login_flow(
                &backend,
                sessions.clone(),
                browser.clone(),
                Duration::from_millis(750),
            );

            // Same net effect as no callback at all
            let result = flow.run().await;
            assert!(matches!(result, Err(OAuth2Error::Timeout(_))));
            assert!(sessions.load().unwrap().is_none());
            backend.verify().await;
        }
    }

    #[tokio::test]
    async fn test_double_callback_delivers_exactly_once() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EXCHANGE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"token": "t1", "email": "a@b.com"})),
            )
            .expect(1)
            .mount(&backend)
            .await;

        let sessions = Arc::new(InMemorySessionStore::new());
        let browser = ScriptedBrowser::new(Script::DoubleApprove("FIRST", "SECOND"));
        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_secs(10),
        );

        let credential = flow.run().await.unwrap();
        assert_eq!(credential.token, "t1");

        let requests = backend.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let code = body["code"].as_str().unwrap();
        assert!(code == "FIRST" || code == "SECOND");

        assert!(port_is_closed(&browser.redirect_uri()).await);
        backend.verify().await;
    }

    #[tokio::test]
    async fn test_external_cancel_wins_the_race() {
        let backend = mock_backend("t1", "a@b.com").await;
        let sessions = Arc::new(InMemorySessionStore::new());
        let browser = ScriptedBrowser::new(Script::Ignore);
        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_secs(60),
        );

        let result = flow
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await;
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(OAuth2Error::Cancelled)));
        assert!(port_is_closed(&browser.redirect_uri()).await);
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_previous_session() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&backend)
            .await;

        let dir = TempDir::new().unwrap();
        let sessions = Arc::new(FileSessionStore::in_dir(dir.path()));
        let previous = sessions
            .save(&Credential::new("old-token", "old@b.com", "Old"))
            .unwrap();

        let browser = ScriptedBrowser::new(Script::Approve("CODE1"));
        let flow = login_flow(
            &backend,
            sessions.clone(),
            browser.clone(),
            Duration::from_secs(10),
        );

        match flow.run().await {
            Err(OAuth2Error::TokenExchangeFailed { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "backend exploded");
            }
            other => panic!("Expected exchange failure, got {:?}", other),
        }

        assert_eq!(sessions.load().unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn test_empty_token_from_backend_fails_login() {
        let backend = mock_backend("", "a@b.com").await;
        let sessions = Arc::new(InMemorySessionStore::new());
        let browser = ScriptedBrowser::new(Script::Approve("CODE1"));
        let flow = login_flow(&backend, sessions.clone(), browser, Duration::from_secs(10));

        assert!(matches!(flow.run().await, Err(OAuth2Error::EmptyToken)));
        assert!(sessions.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_browser_failure_is_not_fatal() {
        let backend = mock_backend("t1", "a@b.com").await;
        let sessions = Arc::new(InMemorySessionStore::new());
        let flow = login_flow(
            &backend,
            sessions,
            Arc::new(BrokenBrowser),
            Duration::from_millis(200),
        );

        // Without a browser nobody redirects, so the wait still runs to its timeout
        assert!(matches!(flow.run().await, Err(OAuth2Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_print_only_browser_waits_for_manual_redirect() {
        let backend = mock_backend("t1", "a@b.com").await;
        let sessions = Arc::new(InMemorySessionStore::new());
        let flow = login_flow(
            &backend,
            sessions,
            Arc::new(PrintOnly),
            Duration::from_millis(200),
        );

        assert!(matches!(flow.run().await, Err(OAuth2Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_each_attempt_uses_fresh_state_and_port() {
        let backend = mock_backend("t1", "a@b.com").await;

        let first = ScriptedBrowser::new(Script::Approve("CODE1"));
        let second = ScriptedBrowser::new(Script::Approve("CODE2"));

        for browser in [&first, &second] {
            let flow = login_flow(
                &backend,
                Arc::new(InMemorySessionStore::new()),
                browser.clone(),
                Duration::from_secs(10),
            );
            flow.run().await.unwrap();
        }

        let a = query_map(&first.opened_url());
        let b = query_map(&second.opened_url());
        assert_ne!(a["state"], b["state"]);
        assert_ne!(a["code_challenge"], b["code_challenge"]);
    }
}
