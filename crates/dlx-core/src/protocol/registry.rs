//! Ordered variant registry with first-match dispatch.

use std::sync::Arc;

use super::ProtocolVariant;
use crate::error::TransferError;
use crate::hls::HlsVariant;
use crate::http::HttpVariant;
use crate::remote::{FtpVariant, SftpVariant};

#[derive(Clone)]
pub struct ProtocolRegistry {
    variants: Vec<Arc<dyn ProtocolVariant>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Default for ProtocolRegistry {
    /// Built-in order: HLS before plain HTTP so `.m3u8` URIs are claimed first.
    fn default() -> Self {
        Self {
            variants: vec![
                Arc::new(HlsVariant),
                Arc::new(HttpVariant),
                Arc::new(FtpVariant),
                Arc::new(SftpVariant),
            ],
        }
    }
}

impl ProtocolRegistry {
    pub fn empty() -> Self {
        Self {
            variants: Vec::new(),
        }
    }

    /// Adds a variant at the highest priority.
    pub fn register(&mut self, variant: Arc<dyn ProtocolVariant>) {
        self.variants.insert(0, variant);
    }

    /// Removes the highest-priority variant called `name`.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn ProtocolVariant>, TransferError> {
        let pos = self
            .variants
            .iter()
            .position(|v| v.name() == name)
            .ok_or_else(|| TransferError::InvalidState(format!("no handler named {}", name)))?;
        Ok(self.variants.remove(pos))
    }

    /// First variant in priority order whose `matches` accepts `uri`.
    pub fn find(&self, uri: &str) -> Option<Arc<dyn ProtocolVariant>> {
        self.variants.iter().find(|v| v.matches(uri)).cloned()
    }

    /// Highest-priority variant registered as `name`.
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn ProtocolVariant>> {
        self.variants.iter().find(|v| v.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.variants.iter().map(|v| v.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::outcome::Outcome;
    use crate::protocol::ProtocolHandler;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait(?Send)]
    impl ProtocolHandler for Noop {
        async fn transfer(&mut self, _job: &mut Job) -> Result<Outcome, TransferError> {
            Ok(Outcome::Success)
        }
    }

    struct Everything;

    impl ProtocolVariant for Everything {
        fn name(&self) -> &'static str {
            "everything"
        }
        fn matches(&self, _uri: &str) -> bool {
            true
        }
        fn create(&self) -> Box<dyn ProtocolHandler> {
            Box::new(Noop)
        }
    }

    #[test]
    fn default_order() {
        assert_eq!(
            ProtocolRegistry::default().names(),
            vec!["hls", "http", "ftp", "sftp"]
        );
    }

    #[test]
    fn first_match_wins() {
        let reg = ProtocolRegistry::default();
        let pick = |uri: &str| reg.find(uri).map(|v| v.name());
        assert_eq!(pick("https://cdn.example.com/live/index.m3u8"), Some("hls"));
        assert_eq!(pick("https://cdn.example.com/file.iso"), Some("http"));
        assert_eq!(pick("ftp://mirror.example.com/pub/a.tar"), Some("ftp"));
        assert_eq!(pick("sftp://user@host/home/user/a.tar"), Some("sftp"));
        assert_eq!(pick("gopher://example.com/"), None);
    }

    #[test]
    fn registered_variant_takes_priority() {
        let mut reg = ProtocolRegistry::default();
        reg.register(Arc::new(Everything));
        assert_eq!(
            reg.find("https://cdn.example.com/file.iso").map(|v| v.name()),
            Some("everything")
        );
        reg.unregister("everything").unwrap();
        assert_eq!(
            reg.find("https://cdn.example.com/file.iso").map(|v| v.name()),
            Some("http")
        );
        assert!(reg.unregister("everything").is_err());
        assert_eq!(reg.by_name("sftp").map(|v| v.name()), Some("sftp"));
        assert!(reg.by_name("everything").is_none());
    }
}
