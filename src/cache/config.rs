use crate::config::CacheSettings;

/// Resolved cache runtime configuration for one group member.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// This node's own cache endpoint, also its identity in the ring.
    pub local_addr: String,
    /// Peer cache endpoints; the local address is added automatically.
    pub members: Vec<String>,
    /// Upper bound for stored values, in bytes.
    pub max_bytes: usize,
}

impl CacheConfig {
    /// Build from settings; `None` when no cache address is configured,
    /// which disables caching entirely.
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        let local_addr = settings.addr.clone()?;
        Some(Self {
            local_addr,
            members: settings.members.clone(),
            max_bytes: settings.max_bytes.get() as usize,
        })
    }
}
