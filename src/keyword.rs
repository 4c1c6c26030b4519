use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::error::{Error, Result};

/// How long an authorization token stays usable.
pub const CREDENTIAL_TTL: Duration = Duration::from_secs(540);
const CREDENTIAL_KEY: &str = "speech-token";

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct SpeechToken {
    pub resource_id: String,
    pub token: String,
    pub region: String,
}

/// Credential handed to the recognition engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationToken {
    token: String,
    region: String,
}

impl AuthorizationToken {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl From<SpeechToken> for AuthorizationToken {
    fn from(t: SpeechToken) -> Self {
        Self {
            token: format!("aad#{}#{}", t.resource_id, t.token),
            region: t.region,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<SpeechToken>;
}

/// Fetches tokens from the backend's token endpoint.
pub struct HttpTokenSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.speech_token_url())
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> anyhow::Result<SpeechToken> {
        let token = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<SpeechToken>()
            .await?;
        Ok(token)
    }
}

/// Keeps the last authorization token for [`CREDENTIAL_TTL`].
#[derive(Clone)]
pub struct CredentialCache {
    cache: Cache<&'static str, AuthorizationToken>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_ttl(CREDENTIAL_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    pub fn get(&self) -> Option<AuthorizationToken> {
        self.cache.get(&CREDENTIAL_KEY)
    }

    pub fn insert(&self, token: AuthorizationToken) {
        self.cache.insert(CREDENTIAL_KEY, token);
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A continuous speech recognizer bound to the default microphone.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Starts recognition; every recognized utterance is sent to `results`.
    async fn start_continuous(&mut self, results: mpsc::UnboundedSender<String>) -> anyhow::Result<()>;
    async fn stop_continuous(&mut self) -> anyhow::Result<()>;
}

pub trait RecognizerFactory: Send {
    fn build(&mut self, token: &AuthorizationToken, language: &str) -> anyhow::Result<Box<dyn RecognitionEngine>>;
}

type SharedEngine = Arc<Mutex<Box<dyn RecognitionEngine>>>;

/// Listens for the activation keyword and signals it once per `start`.
pub struct KeywordDetector {
    keyword: String,
    language: String,
    tokens: Box<dyn TokenSource>,
    cache: CredentialCache,
    factory: Box<dyn RecognizerFactory>,
    engine: Option<SharedEngine>,
    listener: Option<tokio::task::JoinHandle<()>>,
    listening: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl KeywordDetector {
    pub fn new(
        config: &Config,
        tokens: Box<dyn TokenSource>,
        cache: CredentialCache,
        factory: Box<dyn RecognizerFactory>,
    ) -> Self {
        Self {
            keyword: normalize(config.activation_keyword()),
            language: config.speech_language().to_string(),
            tokens,
            cache,
            factory,
            engine: None,
            listener: None,
            listening: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Refreshes the credential and rebuilds the recognition engine.
    pub async fn reset(&mut self) -> Result<()> {
        self.stop().await;
        self.engine = None;

        let token = match self.cache.get() {
            Some(token) => token,
            None => {
                let token: AuthorizationToken = self
                    .tokens
                    .fetch()
                    .await
                    .map_err(|e| Error::AuthUnavailable(format!("{e:#}")))?
                    .into();
                tracing::debug!("fetched speech token for region {}", token.region());
                self.cache.insert(token.clone());
                token
            }
        };

        let engine = self
            .factory
            .build(&token, &self.language)
            .map_err(|e| Error::MicrophoneUnavailable(format!("{e:#}")))?;
        self.engine = Some(Arc::new(Mutex::new(engine)));
        Ok(())
    }

    /// Starts continuous recognition. `on_detected` runs at most once, with the
    /// generation returned here, when an utterance contains the keyword.
    pub async fn start<F>(&mut self, on_detected: F) -> Result<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.stop().await;
        if self.engine.is_none() {
            self.reset().await?;
        }
        let Some(engine) = self.engine.clone() else {
            return Err(Error::AuthUnavailable("no recognition engine".to_string()));
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        engine
            .lock()
            .await
            .start_continuous(results_tx)
            .await
            .map_err(|e| Error::MicrophoneUnavailable(format!("{e:#}")))?;
        self.listening.store(true, Ordering::SeqCst);
        tracing::info!("keyword listening started, generation={}", generation);

        let keyword = self.keyword.clone();
        let current = self.generation.clone();
        let listening = self.listening.clone();
        self.listener = Some(tokio::spawn(async move {
            while let Some(text) = results_rx.recv().await {
                tracing::debug!("recognized: {:?}", text);
                if !contains_keyword(&text, &keyword) {
                    continue;
                }
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                if let Err(e) = engine.lock().await.stop_continuous().await {
                    tracing::warn!("failed to stop recognition: {e:#}");
                }
                listening.store(false, Ordering::SeqCst);
                tracing::info!("keyword detected");
                on_detected(generation);
                return;
            }
        }));
        Ok(generation)
    }

    pub async fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if self.listening.swap(false, Ordering::SeqCst) {
            if let Some(engine) = &self.engine {
                if let Err(e) = engine.lock().await.stop_continuous().await {
                    tracing::warn!("failed to stop recognition: {e:#}");
                }
            }
            tracing::info!("keyword listening stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Generation of the current `start`; stale detections carry an older one.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Drop for KeywordDetector {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_keyword(text: &str, keyword: &str) -> bool {
    !keyword.is_empty() && normalize(text).contains(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRecognizer;
    use std::sync::atomic::AtomicUsize;

    fn token() -> SpeechToken {
        SpeechToken {
            resource_id: "/subscriptions/s/res".to_string(),
            token: "t0k".to_string(),
            region: "westeurope".to_string(),
        }
    }

    fn detector(tokens: MockTokenSource, recognizer: &FakeRecognizer) -> KeywordDetector {
        KeywordDetector::new(
            &Config::builder().build(),
            Box::new(tokens),
            CredentialCache::new(),
            Box::new(recognizer.clone()),
        )
    }

    #[test]
    fn authorization_token_format() {
        let auth = AuthorizationToken::from(token());
        assert_eq!(auth.token(), "aad#/subscriptions/s/res#t0k");
        assert_eq!(auth.region(), "westeurope");
    }

    #[test]
    fn keyword_match_is_case_and_punctuation_insensitive() {
        let keyword = normalize("Assistant");
        assert!(contains_keyword("Hey, Assistant!", &keyword));
        assert!(contains_keyword("ASSISTANT.", &keyword));
        assert!(!contains_keyword("hey there", &keyword));
        assert!(!contains_keyword("anything", ""));
    }

    #[tokio::test]
    async fn reset_uses_cached_credential() {
        // Arrange
        let mut tokens = MockTokenSource::new();
        tokens.expect_fetch().times(1).returning(|| Ok(token()));
        let recognizer = FakeRecognizer::new();
        let mut detector = detector(tokens, &recognizer);

        // Act
        detector.reset().await.unwrap();
        detector.reset().await.unwrap();

        // Assert
        assert_eq!(recognizer.builds(), 2);
        assert_eq!(recognizer.last_token().unwrap().token(), "aad#/subscriptions/s/res#t0k");
        assert_eq!(recognizer.last_language().as_deref(), Some("en-US"));
    }

    #[tokio::test]
    async fn token_failure_is_auth_unavailable() {
        // Arrange
        let mut tokens = MockTokenSource::new();
        tokens
            .expect_fetch()
            .returning(|| Err(anyhow::anyhow!("503 Service Unavailable")));
        let recognizer = FakeRecognizer::new();
        let mut detector = detector(tokens, &recognizer);

        // Act
        let err = detector.reset().await.unwrap_err();

        // Assert
        assert!(matches!(err, Error::AuthUnavailable(_)));
        assert_eq!(recognizer.builds(), 0);
        assert!(!detector.is_listening());
    }

    #[tokio::test]
    async fn engine_failure_is_microphone_unavailable() {
        // Arrange
        let mut tokens = MockTokenSource::new();
        tokens.expect_fetch().returning(|| Ok(token()));
        let recognizer = FakeRecognizer::new();
        recognizer.fail_build(true);
        let mut detector = detector(tokens, &recognizer);

        // Act
        let err = detector.start(|_| {}).await.unwrap_err();

        // Assert
        assert!(matches!(err, Error::MicrophoneUnavailable(_)));
        assert!(!detector.is_listening());
    }

    #[tokio::test]
    async fn keyword_fires_once_and_stops_recognition() {
        // Arrange
        let mut tokens = MockTokenSource::new();
        tokens.expect_fetch().returning(|| Ok(token()));
        let recognizer = FakeRecognizer::new();
        let mut detector = detector(tokens, &recognizer);
        detector.reset().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let generation = detector.start(move |g| tx.send(g).unwrap()).await.unwrap();
        recognizer.say("what time is it");
        recognizer.say("hey assistant");
        recognizer.say("assistant again");

        // Assert
        let detected = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(detected, Some(generation));
        assert_eq!(rx.recv().await, None);
        assert!(!detector.is_listening());
        assert!(!recognizer.is_running());
    }

    #[tokio::test]
    async fn stop_silences_pending_detection() {
        // Arrange
        let mut tokens = MockTokenSource::new();
        tokens.expect_fetch().returning(|| Ok(token()));
        let recognizer = FakeRecognizer::new();
        let mut detector = detector(tokens, &recognizer);
        let fired = Arc::new(AtomicUsize::new(0));

        // Act
        let counter = fired.clone();
        let generation = detector
            .start(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        detector.stop().await;
        detector.stop().await;
        recognizer.say("assistant");
        tokio::task::yield_now().await;

        // Assert
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(detector.generation() > generation);
        assert!(!detector.is_listening());
        assert!(!recognizer.is_running());
    }
}
