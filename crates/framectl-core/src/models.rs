//! Supported frame models.
//!
//! Each frame enumerates twice: first as a USB mass-storage device, then,
//! after the mode switch, under a second product id as a vendor "display"
//! device. The table below pairs the two ids per model.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::protocol::constants::{
    SAMSUNG_VENDOR_ID, SETUP_RESPONSE_FALLBACK, SETUP_RESPONSE_SPF75H, SETUP_RESPONSE_STANDARD,
};
use crate::protocol::request::{self, ControlRequest};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry is empty")]
    EmptyRegistry,
    #[error("Product ID {pid:04X} is used by both {first} and {second}")]
    DuplicateProductId {
        pid: u16,
        first: &'static str,
        second: &'static str,
    },
    #[error("Invalid geometry '{0}', expected WIDTHxHEIGHT")]
    InvalidGeometry(String),
}

/// Known frame models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Spf72H,
    Spf75H,
    Spf83H,
    Spf85H,
    Spf87H,
    Spf87HOld,
    Spf107H,
    Spf107HOld,
}

/// Setup request a model expects, with the response it normally answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupHandshake {
    pub request: ControlRequest,
    pub expected: &'static [u8],
}

impl ModelKind {
    pub fn setup_handshake(&self) -> SetupHandshake {
        match self {
            ModelKind::Spf72H
            | ModelKind::Spf83H
            | ModelKind::Spf85H
            | ModelKind::Spf87H
            | ModelKind::Spf107H => SetupHandshake {
                request: request::SETUP_STANDARD,
                expected: SETUP_RESPONSE_STANDARD,
            },
            ModelKind::Spf75H => SetupHandshake {
                request: request::SETUP_SPF75H,
                expected: SETUP_RESPONSE_SPF75H,
            },
            ModelKind::Spf87HOld | ModelKind::Spf107HOld => SetupHandshake {
                request: request::SETUP_FALLBACK,
                expected: SETUP_RESPONSE_FALLBACK,
            },
        }
    }

    /// Request to issue (response ignored) before the first block of every
    /// upload, if the model needs one.
    pub fn upload_prelude(&self) -> Option<ControlRequest> {
        match self {
            ModelKind::Spf75H => Some(request::UPLOAD_PRELUDE),
            _ => None,
        }
    }
}

/// Display resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Geometry {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidGeometry(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.parse().map_err(|_| invalid())?;
        let height = h.parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// One row of the model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelEntry {
    pub kind: ModelKind,
    pub name: &'static str,
    /// Product ID while enumerated as mass storage.
    pub storage_product_id: u16,
    /// Product ID after switching to display mode.
    pub display_product_id: u16,
    pub geometry: Geometry,
}

impl ModelEntry {
    pub fn matches_product_id(&self, pid: u16) -> bool {
        self.storage_product_id == pid || self.display_product_id == pid
    }
}

const WVGA: Geometry = Geometry::new(800, 480);

/// Built-in table. Order matters: acquisition tries entries top to bottom.
pub const BUILTIN_MODELS: &[ModelEntry] = &[
    ModelEntry {
        kind: ModelKind::Spf72H,
        name: "SPF-72H",
        storage_product_id: 0x200A,
        display_product_id: 0x200B,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf75H,
        name: "SPF-75H",
        storage_product_id: 0x200E,
        display_product_id: 0x200F,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf83H,
        name: "SPF-83H",
        storage_product_id: 0x200C,
        display_product_id: 0x200D,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf85H,
        name: "SPF-85H",
        storage_product_id: 0x2012,
        display_product_id: 0x2013,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf87H,
        name: "SPF-87H",
        storage_product_id: 0x2033,
        display_product_id: 0x2034,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf87HOld,
        name: "SPF-87H (old firmware)",
        storage_product_id: 0x2025,
        display_product_id: 0x2026,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf107H,
        name: "SPF-107H",
        storage_product_id: 0x2035,
        display_product_id: 0x2036,
        geometry: WVGA,
    },
    ModelEntry {
        kind: ModelKind::Spf107HOld,
        name: "SPF-107H (old firmware)",
        storage_product_id: 0x2027,
        display_product_id: 0x2028,
        geometry: WVGA,
    },
];

/// Ordered, validated model table for one vendor.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    vendor_id: u16,
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// Build a registry, rejecting product ids that appear more than once.
    pub fn new(vendor_id: u16, entries: Vec<ModelEntry>) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::EmptyRegistry);
        }

        let mut seen: Vec<(u16, &'static str)> = Vec::with_capacity(entries.len() * 2);
        for entry in &entries {
            let ids = [entry.storage_product_id, entry.display_product_id];
            if ids[0] == ids[1] {
                return Err(RegistryError::DuplicateProductId {
                    pid: ids[0],
                    first: entry.name,
                    second: entry.name,
                });
            }
            for pid in ids {
                if let Some((_, first)) = seen.iter().find(|(p, _)| *p == pid) {
                    return Err(RegistryError::DuplicateProductId {
                        pid,
                        first: *first,
                        second: entry.name,
                    });
                }
                seen.push((pid, entry.name));
            }
        }

        Ok(Self { vendor_id, entries })
    }

    /// The built-in Samsung table.
    pub fn builtin() -> Self {
        Self {
            vendor_id: SAMSUNG_VENDOR_ID,
            entries: BUILTIN_MODELS.to_vec(),
        }
    }

    /// The built-in table under a different vendor id.
    pub fn builtin_with_vendor(vendor_id: u16) -> Self {
        Self {
            vendor_id,
            entries: BUILTIN_MODELS.to_vec(),
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// Entries in acquisition order.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Find the model owning `product_id` in either mode.
    pub fn lookup_by_product_id(&self, vendor_id: u16, product_id: u16) -> Option<&ModelEntry> {
        if vendor_id != self.vendor_id {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.matches_product_id(product_id))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
