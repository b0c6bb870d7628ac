use std::collections::HashMap;

/// Per-peer count of messages that arrived while that peer's thread was closed.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounter {
    counts: HashMap<String, u32>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, peer_id: &str) -> u32 {
        let count = self.counts.entry(peer_id.to_owned()).or_default();
        *count += 1;
        *count
    }

    pub fn reset(&mut self, peer_id: &str) {
        self.counts.remove(peer_id);
    }

    pub fn get(&self, peer_id: &str) -> u32 {
        self.counts.get(peer_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(peer, &count)| (peer.as_str(), count))
    }
}

/// Display text for a count, saturating at `cap` ("9+"). Zero shows nothing.
pub fn badge(count: u32, cap: u32) -> Option<String> {
    match count {
        0 => None,
        n if n > cap => Some(format!("{cap}+")),
        n => Some(n.to_string()),
    }
}
