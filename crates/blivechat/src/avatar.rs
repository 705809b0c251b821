//! Avatar lookups for messages that arrive without one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use blivechat_command::{ChatMessage, DEFAULT_AVATAR_URL};
use blivechat_session::LiveApi;
use tokio::time::Instant;
use tracing::debug;

/// Entries kept before the cache starts over.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Longest a single lookup may take before the default avatar is used.
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a failed uid answers with the default avatar before it is
/// looked up again.
const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    url: String,
    /// Set for failed lookups only.
    expires: Option<Instant>,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        self.expires.is_none_or(|at| Instant::now() < at)
    }
}

/// Caches `avatar_url` lookups per uid.
///
/// Failed or empty lookups yield the default avatar, which is cached for
/// a cooldown so a struggling backend is not asked again for every
/// message. Each lookup is bounded by a timeout.
pub struct AvatarResolver<A> {
    api: Arc<A>,
    cache: Mutex<HashMap<u64, Entry>>,
    capacity: usize,
    lookup_timeout: Duration,
    failure_cooldown: Duration,
}

impl<A: LiveApi> AvatarResolver<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_capacity(api, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(api: Arc<A>, capacity: usize) -> Self {
        Self {
            api,
            cache: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    /// The avatar of `uid`. The backend already returns processed URLs.
    pub async fn resolve(&self, uid: u64, username: Option<&str>) -> String {
        if uid == 0 {
            return DEFAULT_AVATAR_URL.to_owned();
        }
        if let Some(url) = self.cached_url(uid) {
            return url;
        }
        let lookup = tokio::time::timeout(self.lookup_timeout, self.api.avatar_url(uid, username));
        match lookup.await {
            Ok(Ok(url)) if !url.is_empty() => {
                self.store(uid, url.clone(), None);
                url
            }
            Ok(Ok(_)) => self.store_failure(uid),
            Ok(Err(e)) => {
                debug!(uid, error = %e, "avatar lookup failed");
                self.store_failure(uid)
            }
            Err(_) => {
                debug!(uid, timeout_ms = self.lookup_timeout.as_millis() as u64, "avatar lookup timed out");
                self.store_failure(uid)
            }
        }
    }

    /// Fills in the avatar from the cache alone.
    ///
    /// Returns `true` when `msg` is complete afterwards: it needed no
    /// avatar, or the cache had one. `false` means [`fill`](Self::fill)
    /// has to ask the backend.
    pub fn fill_cached(&self, msg: &mut ChatMessage) -> bool {
        let Some((avatar, uid, _)) = missing_avatar(msg) else {
            return true;
        };
        if uid == 0 {
            *avatar = DEFAULT_AVATAR_URL.to_owned();
            return true;
        }
        match self.cached_url(uid) {
            Some(url) => {
                *avatar = url;
                true
            }
            None => false,
        }
    }

    /// Replaces the default avatar on texts and memberships whose author
    /// has a numeric uid.
    pub async fn fill(&self, mut msg: ChatMessage) -> ChatMessage {
        let Some((_, uid, name)) = missing_avatar(&mut msg) else {
            return msg;
        };
        let name = name.to_owned();
        let url = self.resolve(uid, Some(name.as_str())).await;
        if let Some((avatar, _, _)) = missing_avatar(&mut msg) {
            *avatar = url;
        }
        msg
    }

    pub fn cached(&self) -> usize {
        self.lock().len()
    }

    fn cached_url(&self, uid: u64) -> Option<String> {
        self.lock()
            .get(&uid)
            .filter(|e| e.is_fresh())
            .map(|e| e.url.clone())
    }

    fn store_failure(&self, uid: u64) -> String {
        let url = DEFAULT_AVATAR_URL.to_owned();
        self.store(uid, url.clone(), Some(Instant::now() + self.failure_cooldown));
        url
    }

    fn store(&self, uid: u64, url: String, expires: Option<Instant>) {
        let mut cache = self.lock();
        if cache.len() >= self.capacity && !cache.contains_key(&uid) {
            cache.clear();
        }
        cache.insert(uid, Entry { url, expires });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Entry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The avatar slot, uid and author name of a message still showing the
/// default avatar.
fn missing_avatar(msg: &mut ChatMessage) -> Option<(&mut String, u64, &str)> {
    let (avatar, uid, name) = match msg {
        ChatMessage::AddText(m) => (&mut m.avatar_url, &m.author_uid, &m.author_name),
        ChatMessage::AddMember(m) => (&mut m.avatar_url, &m.author_uid, &m.author_name),
        _ => return None,
    };
    if avatar.as_str() != DEFAULT_AVATAR_URL {
        return None;
    }
    let uid = uid.parse::<u64>().ok()?;
    Some((avatar, uid, name.as_str()))
}

impl<A> std::fmt::Debug for AvatarResolver<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarResolver")
            .field("capacity", &self.capacity)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("failure_cooldown", &self.failure_cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use blivechat_command::TextMessage;
    use blivechat_session::{ApiStatus, RoomInfo, SessionError, StartGameResponse, TextEmoticonMapping};

    use super::*;

    /// Answers `avatar_url` after `delay`, failing when `fail` is set.
    struct SlowAvatars {
        delay: Duration,
        fail: bool,
        lookups: AtomicUsize,
    }

    impl SlowAvatars {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail,
                lookups: AtomicUsize::new(0),
            })
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl LiveApi for SlowAvatars {
        async fn room_info(&self, _room_id: u64) -> Result<RoomInfo, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn avatar_url(&self, uid: u64, _name: Option<&str>) -> Result<String, SessionError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(SessionError::NoEndpoint);
            }
            Ok(format!("//face/{uid}.jpg"))
        }

        async fn text_emoticon_mappings(&self) -> Result<Vec<TextEmoticonMapping>, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn start_game(&self, _code: &str, _app_id: u64) -> Result<StartGameResponse, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn end_game(&self, _app_id: u64, _game_id: &str) -> Result<ApiStatus, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn game_heartbeat(&self, _game_id: &str) -> Result<ApiStatus, SessionError> {
            Err(SessionError::NoEndpoint)
        }
    }

    fn text_from(uid: &str) -> ChatMessage {
        ChatMessage::AddText(TextMessage {
            avatar_url: DEFAULT_AVATAR_URL.into(),
            author_uid: uid.into(),
            author_name: "viewer".into(),
            ..Default::default()
        })
    }

    fn avatar_of(msg: &ChatMessage) -> &str {
        match msg {
            ChatMessage::AddText(m) => &m.avatar_url,
            other => panic!("expected text, got {}", other.kind()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_cached_needs_lookup_until_resolved() {
        let api = SlowAvatars::new(Duration::from_millis(10), false);
        let resolver = AvatarResolver::new(api.clone());

        let mut msg = text_from("7");
        assert!(!resolver.fill_cached(&mut msg));
        let msg = resolver.fill(msg).await;
        assert_eq!(avatar_of(&msg), "//face/7.jpg");

        let mut again = text_from("7");
        assert!(resolver.fill_cached(&mut again));
        assert_eq!(avatar_of(&again), "//face/7.jpg");
        assert_eq!(api.lookups(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_cached_skips_messages_with_avatar() {
        let resolver = AvatarResolver::new(SlowAvatars::new(Duration::ZERO, false));
        let mut msg = ChatMessage::AddText(TextMessage {
            avatar_url: "//face/own.jpg".into(),
            author_uid: "7".into(),
            ..Default::default()
        });
        assert!(resolver.fill_cached(&mut msg));
        assert_eq!(avatar_of(&msg), "//face/own.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out_to_default() {
        let api = SlowAvatars::new(Duration::from_secs(30), false);
        let resolver = AvatarResolver::new(api.clone());
        let start = Instant::now();
        assert_eq!(resolver.resolve(7, None).await, DEFAULT_AVATAR_URL);
        assert_eq!(start.elapsed(), DEFAULT_LOOKUP_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_cached_for_cooldown() {
        let api = SlowAvatars::new(Duration::ZERO, true);
        let resolver = AvatarResolver::new(api.clone()).with_failure_cooldown(Duration::from_secs(60));

        assert_eq!(resolver.resolve(7, None).await, DEFAULT_AVATAR_URL);
        assert_eq!(resolver.resolve(7, None).await, DEFAULT_AVATAR_URL);
        assert_eq!(api.lookups(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        resolver.resolve(7, None).await;
        assert_eq!(api.lookups(), 2);
    }
}
