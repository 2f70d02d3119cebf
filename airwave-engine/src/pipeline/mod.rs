//! Generation/cache pipeline
//!
//! Coordinates text generation and speech synthesis for one transition key,
//! with request coalescing and TTL caching:
//!
//! - Cache lookup precedes any generation; a hit short-circuits.
//! - At most one text generation is in flight per transition key, and at most
//!   one synthesis per `(text, provider)` pair. Concurrent callers share the
//!   same in-flight future and never duplicate upstream calls.
//! - Text generation is infallible from the caller's view: any failure yields
//!   the deterministic fallback line. Synthesis failure leaves the
//!   announcement without audio; the orchestrator decides what to do next.
//! - Pre-warm and trigger requests are the same call; pre-warm is simply an
//!   early invocation whose result lands in cache.

pub mod cache;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airwave_common::error::Result;
use airwave_common::types::{TrackRef, TransitionKey};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::providers::{AudioHandle, GenerationContext, Settings, SpeechSynthesizer, TextGenerator};
use cache::AnnouncementCache;

/// The produced announcement for one transition.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub key: TransitionKey,
    pub text: String,
    /// Absent when synthesis failed; the text is still usable for a native
    /// speech fallback.
    pub audio: Option<AudioHandle>,
    /// True when the text came from cache rather than a fresh generation.
    pub cached: bool,
}

type SharedText = Shared<BoxFuture<'static, String>>;
type SharedAudio = Shared<BoxFuture<'static, std::result::Result<AudioHandle, String>>>;

/// Deterministic announcement used whenever generation fails or is skipped.
pub fn fallback_text(next: &TrackRef) -> String {
    format!("Coming up next: {} by {}.", next.title, next.artist)
}

/// Coalescing generation/synthesis pipeline with a TTL cache.
///
/// The pipeline owns the cache and the in-flight registries; nothing else
/// mutates them. Locks are never held across await points.
pub struct GenerationPipeline {
    generators: HashMap<String, Arc<dyn TextGenerator>>,
    synthesizers: HashMap<String, Arc<dyn SpeechSynthesizer>>,
    default_generator: Arc<dyn TextGenerator>,
    default_synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<Mutex<AnnouncementCache>>,
    inflight_text: Arc<Mutex<HashMap<TransitionKey, (u64, SharedText)>>>,
    inflight_audio: Arc<Mutex<HashMap<(String, String), (u64, SharedAudio)>>>,
    /// Tickets distinguish an in-flight entry from a later one under the
    /// same key, so settle-time cleanup never removes a successor.
    ticket_seq: AtomicU64,
}

impl GenerationPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache_ttl: Duration,
    ) -> Self {
        let mut generators: HashMap<String, Arc<dyn TextGenerator>> = HashMap::new();
        generators.insert(generator.provider_id().to_string(), Arc::clone(&generator));
        let mut synthesizers: HashMap<String, Arc<dyn SpeechSynthesizer>> = HashMap::new();
        synthesizers.insert(
            synthesizer.provider_id().to_string(),
            Arc::clone(&synthesizer),
        );

        Self {
            generators,
            synthesizers,
            default_generator: generator,
            default_synthesizer: synthesizer,
            cache: Arc::new(Mutex::new(AnnouncementCache::new(cache_ttl))),
            inflight_text: Arc::new(Mutex::new(HashMap::new())),
            inflight_audio: Arc::new(Mutex::new(HashMap::new())),
            ticket_seq: AtomicU64::new(0),
        }
    }

    /// Register an additional text provider, selectable via settings.
    pub fn with_text_provider(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generators
            .insert(generator.provider_id().to_string(), generator);
        self
    }

    /// Register an additional speech provider, selectable via settings.
    pub fn with_speech_provider(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizers
            .insert(synthesizer.provider_id().to_string(), synthesizer);
        self
    }

    fn generator_for(&self, id: &str) -> Arc<dyn TextGenerator> {
        match self.generators.get(id) {
            Some(generator) => Arc::clone(generator),
            None => {
                warn!(provider = id, "unknown text provider, using default");
                Arc::clone(&self.default_generator)
            }
        }
    }

    fn synthesizer_for(&self, id: &str) -> Arc<dyn SpeechSynthesizer> {
        match self.synthesizers.get(id) {
            Some(synthesizer) => Arc::clone(synthesizer),
            None => {
                warn!(provider = id, "unknown speech provider, using default");
                Arc::clone(&self.default_synthesizer)
            }
        }
    }

    /// Produce the announcement for `key`, reusing cached or in-flight work.
    ///
    /// Providers are resolved from the settings snapshot the caller took at
    /// transition start, so a live provider switch applies to the next
    /// transition and never reconfigures one in flight. Pre-warm and trigger
    /// callers go through the exact same path; only the logging differs.
    pub async fn request(
        &self,
        key: TransitionKey,
        prev: &TrackRef,
        next: &TrackRef,
        is_prewarm: bool,
        settings: &Settings,
    ) -> Result<Announcement> {
        // Full cache hit short-circuits before any upstream work.
        if let Some((text, Some(audio))) = self.cached_parts(&key) {
            debug!(%key, is_prewarm, "announcement cache hit");
            return Ok(Announcement {
                key,
                text,
                audio: Some(audio),
                cached: true,
            });
        }

        let (text, cached) = match self.cached_parts(&key) {
            Some((text, None)) => (text, true),
            _ => {
                if is_prewarm {
                    info!(%key, "pre-warm generation starting");
                } else {
                    info!(%key, "announcement generation starting");
                }
                let generator = self.generator_for(&settings.text_provider);
                let text = self.text_shared(&key, prev, next, generator).await;
                (text, false)
            }
        };

        let synthesizer = self.synthesizer_for(&settings.speech_provider);
        let audio_key = (text.clone(), synthesizer.provider_id().to_string());
        match self.audio_shared(&key, audio_key, synthesizer).await {
            Ok(audio) => Ok(Announcement {
                key,
                text,
                audio: Some(audio),
                cached,
            }),
            Err(reason) => {
                warn!(%key, %reason, "synthesis failed, announcement has no audio");
                Ok(Announcement {
                    key,
                    text,
                    audio: None,
                    cached,
                })
            }
        }
    }

    /// Drop the cached entry for a key, e.g. after its audio failed to play.
    /// A later request regenerates rather than retrying a poisoned handle.
    pub fn evict(&self, key: &TransitionKey) {
        if self.cache.lock().unwrap().evict(key) {
            info!(%key, "evicted announcement cache entry");
        }
    }

    /// Remove expired cache entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.cache.lock().unwrap().purge_expired()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Periodic expiry sweep, complementing lazy expiry on lookup.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                pipeline.purge_expired();
            }
        })
    }

    fn cached_parts(&self, key: &TransitionKey) -> Option<(String, Option<AudioHandle>)> {
        let mut cache = self.cache.lock().unwrap();
        cache
            .get(key)
            .map(|entry| (entry.text.clone(), entry.audio.clone()))
    }

    /// Get or create the single in-flight text generation for this key.
    fn text_shared(
        &self,
        key: &TransitionKey,
        prev: &TrackRef,
        next: &TrackRef,
        generator: Arc<dyn TextGenerator>,
    ) -> SharedText {
        let mut inflight = self.inflight_text.lock().unwrap();
        if let Some((_, fut)) = inflight.get(key) {
            debug!(%key, "coalescing onto in-flight text generation");
            return fut.clone();
        }

        let ticket = self.ticket_seq.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.inflight_text);
        let key_owned = key.clone();
        let prev = prev.clone();
        let next = next.clone();

        let fut: SharedText = async move {
            let ctx = GenerationContext::now();
            let text = match generator.generate(&prev, &next, &ctx).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(key = %key_owned, error = %e, "text generation failed, using fallback");
                    fallback_text(&next)
                }
            };

            cache
                .lock()
                .unwrap()
                .put_text(key_owned.clone(), text.clone());

            // Release the registry slot; ticket check protects a successor.
            let mut registry = registry.lock().unwrap();
            if registry.get(&key_owned).is_some_and(|(t, _)| *t == ticket) {
                registry.remove(&key_owned);
            }

            text
        }
        .boxed()
        .shared();

        inflight.insert(key.clone(), (ticket, fut.clone()));
        fut
    }

    /// Get or create the single in-flight synthesis for `(text, provider)`.
    fn audio_shared(
        &self,
        key: &TransitionKey,
        audio_key: (String, String),
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> SharedAudio {
        let mut inflight = self.inflight_audio.lock().unwrap();
        if let Some((_, fut)) = inflight.get(&audio_key) {
            debug!(%key, "coalescing onto in-flight synthesis");
            return fut.clone();
        }

        let ticket = self.ticket_seq.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.inflight_audio);
        let key_owned = key.clone();
        let audio_key_owned = audio_key.clone();

        let fut: SharedAudio = async move {
            let text = audio_key_owned.0.as_str();
            let result = synthesizer
                .synthesize(text)
                .await
                .map_err(|e| e.to_string());

            if let Ok(audio) = &result {
                cache.lock().unwrap().attach_audio(&key_owned, audio.clone());
            }

            let mut registry = registry.lock().unwrap();
            if registry
                .get(&audio_key_owned)
                .is_some_and(|(t, _)| *t == ticket)
            {
                registry.remove(&audio_key_owned);
            }

            result
        }
        .boxed()
        .shared();

        inflight.insert(audio_key, (ticket, fut.clone()));
        fut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_common::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingGenerator {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingGenerator {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for CountingGenerator {
        fn provider_id(&self) -> &str {
            "counting"
        }

        async fn generate(
            &self,
            prev: &TrackRef,
            next: &TrackRef,
            _ctx: &GenerationContext,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::Generation("model offline".into()));
            }
            Ok(format!("From {} into {}!", prev.title, next.title))
        }
    }

    struct CountingSynthesizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSynthesizer {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynthesizer {
        fn provider_id(&self) -> &str {
            "counting-tts"
        }

        async fn synthesize(&self, text: &str) -> Result<AudioHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Synthesis("tts offline".into()));
            }
            Ok(AudioHandle::new(
                text.as_bytes().to_vec(),
                "audio/wav",
                "counting-tts",
            ))
        }
    }

    fn selection() -> Settings {
        Settings {
            enabled: true,
            text_provider: "counting".into(),
            speech_provider: "counting-tts".into(),
        }
    }

    fn tracks() -> (TrackRef, TrackRef, TransitionKey) {
        let prev = TrackRef::new("Hello", "Adele");
        let next = TrackRef::new("Levitating", "Dua Lipa");
        let key = TransitionKey::new(&prev, &next);
        (prev, next, key)
    }

    fn pipeline(
        generator: Arc<CountingGenerator>,
        synthesizer: Arc<CountingSynthesizer>,
    ) -> Arc<GenerationPipeline> {
        Arc::new(GenerationPipeline::new(
            generator,
            synthesizer,
            Duration::from_secs(600),
        ))
    }

    struct AltGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for AltGenerator {
        fn provider_id(&self) -> &str {
            "alt"
        }

        async fn generate(
            &self,
            _prev: &TrackRef,
            next: &TrackRef,
            _ctx: &GenerationContext,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Alt intro for {}.", next.title))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_select_registered_provider() {
        let default_gen = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let alt_gen = Arc::new(AltGenerator {
            calls: AtomicUsize::new(0),
        });
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = GenerationPipeline::new(
            Arc::clone(&default_gen) as Arc<dyn TextGenerator>,
            Arc::clone(&synthesizer) as Arc<dyn SpeechSynthesizer>,
            Duration::from_secs(600),
        )
        .with_text_provider(Arc::clone(&alt_gen) as Arc<dyn TextGenerator>);
        let (prev, next, key) = tracks();

        let settings = Settings {
            text_provider: "alt".into(),
            ..selection()
        };
        let announcement = pipeline
            .request(key, &prev, &next, false, &settings)
            .await
            .unwrap();

        assert_eq!(announcement.text, "Alt intro for Levitating.");
        assert_eq!(alt_gen.calls.load(Ordering::SeqCst), 1);
        assert_eq!(default_gen.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_provider_falls_back_to_default() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        let settings = Settings {
            text_provider: "no-such-provider".into(),
            speech_provider: "no-such-voice".into(),
            ..selection()
        };
        let announcement = pipeline
            .request(key, &prev, &next, false, &settings)
            .await
            .unwrap();

        assert!(announcement.audio.is_some());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_coalesce() {
        let generator = Arc::new(CountingGenerator::new(Duration::from_millis(50), false));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let p = Arc::clone(&pipeline);
            let (prev, next, key) = (prev.clone(), next.clone(), key.clone());
            handles.push(tokio::spawn(async move {
                p.request(key, &prev, &next, false, &selection()).await.unwrap()
            }));
        }

        for handle in handles {
            let announcement = handle.await.unwrap();
            assert!(announcement.audio.is_some());
        }

        // Exactly one upstream call each despite five concurrent requests.
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prewarm_then_trigger_is_cache_hit() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        let first = pipeline
            .request(key.clone(), &prev, &next, true, &selection())
            .await
            .unwrap();
        assert!(!first.cached);

        let second = pipeline.request(key, &prev, &next, false, &selection()).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.text, first.text);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_regenerates() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        pipeline
            .request(key.clone(), &prev, &next, true, &selection())
            .await
            .unwrap();
        assert_eq!(pipeline.cache_len(), 1);

        tokio::time::advance(Duration::from_secs(601)).await;

        let again = pipeline.request(key, &prev, &next, false, &selection()).await.unwrap();
        assert!(!again.cached);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_yields_fallback() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, true));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        let announcement = pipeline.request(key, &prev, &next, false, &selection()).await.unwrap();
        assert_eq!(
            announcement.text,
            "Coming up next: Levitating by Dua Lipa."
        );
        // Fallback text is still synthesized.
        assert!(announcement.audio.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_failure_keeps_text() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let synthesizer = Arc::new(CountingSynthesizer::new(true));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        let announcement = pipeline
            .request(key.clone(), &prev, &next, false, &selection())
            .await
            .unwrap();
        assert!(announcement.audio.is_none());
        assert!(!announcement.text.is_empty());

        // Text stays cached; a later request may retry synthesis.
        assert_eq!(pipeline.cache_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_forces_regeneration() {
        let generator = Arc::new(CountingGenerator::new(Duration::ZERO, false));
        let synthesizer = Arc::new(CountingSynthesizer::new(false));
        let pipeline = pipeline(Arc::clone(&generator), Arc::clone(&synthesizer));
        let (prev, next, key) = tracks();

        pipeline
            .request(key.clone(), &prev, &next, false, &selection())
            .await
            .unwrap();
        pipeline.evict(&key);

        pipeline.request(key, &prev, &next, false, &selection()).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }
}
