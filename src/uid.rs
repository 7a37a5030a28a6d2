//! DICOM UID allocation under a registered namespace root

use uuid::Uuid;

/// Root used when the deployment does not configure its own
pub const DEFAULT_UID_ROOT: &str = "1.2.826.0.1.3680043.2.1125";

/// Maximum length of a UID value (VR UI)
pub const MAX_UID_LEN: usize = 64;

/// Generate a fresh UID under `root`.
///
/// The suffix is the high 64 bits of a random (v4) UUID rendered in decimal,
/// so uniqueness is probabilistic and nothing is persisted.
pub fn generate(root: &str) -> String {
    let suffix = Uuid::new_v4().as_u128() >> 64;
    format!("{}.{}", root.trim_end_matches('.'), suffix)
}

/// Check a value against the UID grammar: dot-separated numeric components,
/// no empty component, no leading zero in a multi-digit component and at
/// most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > MAX_UID_LEN {
        return false;
    }
    uid.split('.').all(|component| {
        !component.is_empty()
            && component.bytes().all(|b| b.is_ascii_digit())
            && !(component.len() > 1 && component.starts_with('0'))
    })
}

/// UID source bound to a configured root
#[derive(Debug, Clone)]
pub struct UidAllocator {
    root: String,
}

impl UidAllocator {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn next(&self) -> String {
        generate(&self.root)
    }
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_UID_ROOT)
    }
}
