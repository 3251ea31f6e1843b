//! Bank tag catalog
//!
//! Every bank tag the decoder understands is listed once in [`CATALOG`],
//! together with its role in dispatch and, for composite banks, the format
//! its payload follows. Adding a tag means adding a row here and a decode
//! function for its [`BankTag`] variant.

use serde::{Deserialize, Serialize};

/// Known bank formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BankTag {
    /// Run/event header (57615)
    Header,
    /// Trigger-interface timestamp and trigger bits (57610)
    TriggerInterface,
    /// XY hodoscope TDC (57655)
    Hodoscope,
    /// SRS/APV25 frames (57631)
    Srs,
    /// VMM3 hit words (57653)
    Vmm3,
    /// SVT FSSR hits (57617)
    Svt,
    /// FADC pulse summary hits: time, integral, min, max (57602)
    PulseSummary,
    /// FADC window samples (57601)
    PulseWindow,
    /// Uncompressed MicroMegas samples (57627)
    MicroMegasRaw,
    /// Bit-packed MicroMegas samples (57640)
    MicroMegasPacked,
    /// Drift-chamber TDC (57622)
    DriftChamberTdc,
    /// RICH fiber/channel TDC (57636)
    RichTdc,
    /// RTPC bit-packed multi-pulse samples (57641)
    Rtpc,
    /// Legacy TDC words (57607)
    LegacyTdc,
    /// Trigger-processor words (57634)
    Vtp,
    /// Helicity-gated scalers (57637)
    HelicityScaler,
    /// Flat scaler array (57621)
    FlatScaler,
    /// Slow-controls text (57620)
    Epics,
    /// Helicity decoder board (57651)
    HelicityDecoder,
    /// Legacy packed FADC window data (57638)
    PackedFadc,
}

/// How a bank takes part in per-event dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankRole {
    /// Updates run/event state and marks the TI master crate
    Header,
    /// Contributes to timestamp synchronization
    TriggerInterface,
    /// Decoded alongside the other combine banks of the branch
    Combine,
    /// At most one per branch is decoded
    Legacy,
    /// Decoded in a separate pass over all branches
    Ancillary,
    /// Only decoded on request (raw FADC buffers)
    OnDemand,
}

/// One row of the tag catalog
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub tag: u16,
    pub bank: BankTag,
    pub role: BankRole,
    /// Composite format of the payload, for composite banks
    pub schema: Option<&'static str>,
}

const fn entry(tag: u16, bank: BankTag, role: BankRole, schema: Option<&'static str>) -> CatalogEntry {
    CatalogEntry {
        tag,
        bank,
        role,
        schema,
    }
}

/// Family A: slot, trigger, coarse time, then channels of sample arrays
pub const FAMILY_A: &str = "c,i,l,N(c,Ns)";
/// Family B: slot, then channels of sample arrays (no timestamp)
pub const FAMILY_B: &str = "c,m(c,ms)";

/// Rows are in [`BankTag`] declaration order
pub static CATALOG: &[CatalogEntry] = &[
    entry(57615, BankTag::Header, BankRole::Header, None),
    entry(57610, BankTag::TriggerInterface, BankRole::TriggerInterface, None),
    entry(57655, BankTag::Hodoscope, BankRole::Combine, Some("c,i,l,N(c,s)")),
    entry(57631, BankTag::Srs, BankRole::Combine, None),
    entry(57653, BankTag::Vmm3, BankRole::Combine, None),
    entry(57617, BankTag::Svt, BankRole::Legacy, Some("c,i,l,N(c,c,c,c)")),
    entry(57602, BankTag::PulseSummary, BankRole::Legacy, Some("c,i,l,N(c,N(s,i,s,s))")),
    entry(57601, BankTag::PulseWindow, BankRole::Legacy, Some(FAMILY_A)),
    entry(57627, BankTag::MicroMegasRaw, BankRole::Legacy, Some("c,i,l,N(s,Ns)")),
    entry(57640, BankTag::MicroMegasPacked, BankRole::Legacy, Some("c,i,l,n(s,mc)")),
    entry(57622, BankTag::DriftChamberTdc, BankRole::Legacy, Some("c,i,l,N(c,s)")),
    entry(57636, BankTag::RichTdc, BankRole::Legacy, Some("c,i,l,N(c,c,s)")),
    entry(57641, BankTag::Rtpc, BankRole::Legacy, Some("c,i,l,n(s,m(c,mc))")),
    entry(57607, BankTag::LegacyTdc, BankRole::Ancillary, None),
    entry(57634, BankTag::Vtp, BankRole::Ancillary, None),
    entry(57637, BankTag::HelicityScaler, BankRole::Ancillary, None),
    entry(57621, BankTag::FlatScaler, BankRole::Ancillary, None),
    entry(57620, BankTag::Epics, BankRole::Ancillary, None),
    entry(57651, BankTag::HelicityDecoder, BankRole::Ancillary, None),
    entry(57638, BankTag::PackedFadc, BankRole::OnDemand, Some(FAMILY_B)),
];

impl BankTag {
    /// Look up a numeric bank tag
    pub fn from_tag(tag: u16) -> Option<Self> {
        CATALOG.iter().find(|e| e.tag == tag).map(|e| e.bank)
    }

    fn entry(self) -> &'static CatalogEntry {
        &CATALOG[self as usize]
    }

    pub fn tag(self) -> u16 {
        self.entry().tag
    }

    pub fn role(self) -> BankRole {
        self.entry().role
    }

    pub fn schema(self) -> Option<&'static str> {
        self.entry().schema
    }
}

impl std::fmt::Display for BankTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.tag())
    }
}
