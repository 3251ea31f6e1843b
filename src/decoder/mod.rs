//! Event decoder: tag dispatch, state tracking and timestamp synchronization
//!
//! [`CodaDecoder`] turns the top-level banks of one event into a flat list of
//! [`DigitizationRecord`]s. Each top-level bank with children is one crate
//! (a [`Branch`]); inside a crate the banks are dispatched by tag through the
//! [`catalog`].
//!
//! Per crate, the combine banks (hodoscope, SRS, VMM3) are all decoded when
//! any of them is present. Otherwise the first legacy bank of the crate is
//! decoded. Trigger-interface banks of all crates are then reconciled into
//! one event timestamp, and the ancillary banks (legacy TDC words, VTP,
//! scalers, EPICS, helicity decoder) are read in a final pass.
//!
//! A decoder is stateful: run number, event number and timestamp carry over
//! to the next event when it has no header bank. Use one decoder per stream
//! and feed it events in order.

pub mod ancillary;
pub mod apv25;
pub mod bits;
pub mod catalog;
pub mod header;
pub mod micromegas;
pub mod pulse;
pub mod state;
pub mod sync;
pub mod tdc;
pub mod vmm3;

use std::collections::BTreeMap;

pub use ancillary::HelicityDecoderRecord;
pub use catalog::{BankRole, BankTag, CatalogEntry, CATALOG};
pub use state::{HelicityBit, PerEventState, PersistentState};
pub use sync::{DesyncLog, SyncOutcome, TimestampSync};

use crate::common::{DecodeError, DigitizationRecord, FadcRecord};
use crate::composite::{CompositeData, CompositeError, CompositeFormat};
use crate::config::DecoderConfig;
use crate::evio::{build_branches, find_branch, Branch, EvioNode};

/// Decode the composite payload of a catalog bank
pub(crate) fn composite_payload<N: EvioNode>(node: &N, bank: BankTag) -> Result<CompositeData, CompositeError> {
    let schema = bank
        .schema()
        .ok_or_else(|| CompositeError::Wrapper(format!("{bank} has no composite schema")))?;
    let format = CompositeFormat::parse(schema)?;
    let data = CompositeData::from_node(node, &format)?;
    if data.is_truncated() {
        tracing::debug!(
            tag = node.tag(),
            num = node.num(),
            items = data.items().len(),
            "Composite data ends inside a format element"
        );
    }
    Ok(data)
}

/// Decoder of one combine or legacy bank
///
/// Records pushed before an error are kept by the caller only when the
/// error is a truncation.
type BankDecoder<N> = fn(i32, &N, &mut Vec<DigitizationRecord>) -> Result<(), CompositeError>;

fn decoder_for<N: EvioNode>(bank: BankTag) -> Option<BankDecoder<N>> {
    let decoder: BankDecoder<N> = match bank {
        BankTag::Hodoscope => tdc::decode_hodoscope,
        BankTag::Srs => apv25::decode_srs,
        BankTag::Vmm3 => vmm3::decode_vmm3,
        BankTag::Svt => pulse::decode_svt,
        BankTag::PulseSummary => pulse::decode_pulse_summary,
        BankTag::PulseWindow => pulse::decode_pulse_window,
        BankTag::MicroMegasRaw => pulse::decode_micromegas_raw,
        BankTag::MicroMegasPacked => micromegas::decode_packed,
        BankTag::DriftChamberTdc => pulse::decode_drift_chamber,
        BankTag::RichTdc => tdc::decode_rich,
        BankTag::Rtpc => micromegas::decode_rtpc,
        _ => return None,
    };
    Some(decoder)
}

/// Ancillary banks that emit records, in output order
const RECORD_PASSES: [BankTag; 4] = [
    BankTag::LegacyTdc,
    BankTag::Vtp,
    BankTag::HelicityScaler,
    BankTag::FlatScaler,
];

/// Stateful decoder for the events of one run
#[derive(Debug, Clone)]
pub struct CodaDecoder {
    config: DecoderConfig,
    sync: TimestampSync,
    state: PersistentState,
    event: PerEventState,
}

impl CodaDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        let sync = TimestampSync::new(config.timestamp_tolerance, config.max_timestamp_warnings);
        Self {
            config,
            sync,
            state: PersistentState::default(),
            event: PerEventState::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DecoderConfig::default())
    }

    /// Decode all crates of one event
    ///
    /// `nodes` are the event's top-level banks. Bank-level problems never
    /// fail the call; they are logged and collected in [`Self::diagnostics`].
    pub fn decode_event<N: EvioNode>(&mut self, nodes: &[N]) -> Vec<DigitizationRecord> {
        self.event = PerEventState::default();
        let branches = build_branches(nodes);

        let mut records = Vec::new();
        for branch in &branches {
            if let Some(decoded) = self.decode_branch(branch) {
                records.extend(decoded);
            }
        }
        self.synchronize(&branches);
        self.decode_ancillary(&branches, &mut records);

        tracing::trace!(
            run = self.state.run_number,
            event = self.state.event_number,
            crates = branches.len(),
            records = records.len(),
            "Decoded event"
        );
        records
    }

    /// Decode the combine or legacy banks of one crate
    ///
    /// `None` when the crate has no branch or its selected bank was corrupt.
    pub fn decode_crate<N: EvioNode>(
        &mut self,
        branches: &[Branch<'_, N>],
        crate_id: u16,
    ) -> Option<Vec<DigitizationRecord>> {
        let branch = find_branch(branches, crate_id)?;
        self.decode_branch(branch)
    }

    fn decode_branch<N: EvioNode>(&mut self, branch: &Branch<'_, N>) -> Option<Vec<DigitizationRecord>> {
        let crate_id = branch.tag();

        for node in branch.nodes_with_tag(BankTag::Header.tag()) {
            self.state.ti_master = Some(crate_id);
            if let Err(err) = header::read_header(crate_id, node, &mut self.state) {
                tracing::error!(crate_id, "{}", err);
                self.event.diagnostics.push(err);
            }
        }

        let combine: Vec<(&N, BankTag)> = CATALOG
            .iter()
            .filter(|entry| entry.role == BankRole::Combine)
            .flat_map(|entry| branch.nodes_with_tag(entry.tag).map(move |node| (node, entry.bank)))
            .collect();
        if !combine.is_empty() {
            let mut out = Vec::new();
            for (node, bank) in combine {
                if let Some(records) = self.run_bank(crate_id, node, bank) {
                    out.extend(records);
                }
            }
            return Some(out);
        }

        let legacy = branch.nodes().iter().find_map(|node| {
            BankTag::from_tag(node.tag())
                .filter(|bank| bank.role() == BankRole::Legacy)
                .map(|bank| (*node, bank))
        });
        match legacy {
            Some((node, bank)) => self.run_bank(crate_id, node, bank),
            None => Some(Vec::new()),
        }
    }

    fn run_bank<N: EvioNode>(&mut self, crate_id: u16, node: &N, bank: BankTag) -> Option<Vec<DigitizationRecord>> {
        let Some(decoder) = decoder_for::<N>(bank) else {
            tracing::debug!(crate_id, %bank, "No record decoder for bank");
            return Some(Vec::new());
        };
        let mut out = Vec::new();
        match decoder(crate_id as i32, node, &mut out) {
            Ok(()) => Some(out),
            Err(err) => self.report(crate_id, node, err, out.len()).then_some(out),
        }
    }

    /// Log and record a bank failure; returns whether partial records stay valid
    fn report<N: EvioNode>(&mut self, crate_id: u16, node: &N, err: CompositeError, decoded: usize) -> bool {
        let err = DecodeError::from_composite(crate_id as i32, node.tag(), node.num(), err);
        let keep = !err.drops_bank();
        if keep {
            tracing::debug!(crate_id, tag = node.tag(), num = node.num(), decoded, "{}", err);
        } else {
            tracing::warn!(crate_id, tag = node.tag(), num = node.num(), "{}", err);
        }
        self.event.diagnostics.push(err);
        keep
    }

    fn synchronize<N: EvioNode>(&mut self, branches: &[Branch<'_, N>]) {
        let mut entries = Vec::new();
        for branch in branches {
            for node in branch.nodes_with_tag(BankTag::TriggerInterface.tag()) {
                if let Some(entry) =
                    header::read_trigger_interface(branch.tag(), node, &mut self.state, &mut self.event)
                {
                    entries.push(entry);
                }
            }
        }
        let outcome = self.sync.resolve(
            &entries,
            self.state.ti_master,
            &mut self.state.timestamp_error_count,
            &mut self.event.diagnostics,
        );
        self.state.timestamp = outcome.timestamp;
        self.event.desync_log = outcome.log;
    }

    fn decode_ancillary<N: EvioNode>(&mut self, branches: &[Branch<'_, N>], records: &mut Vec<DigitizationRecord>) {
        for bank in RECORD_PASSES {
            for branch in branches {
                let crate_id = branch.tag() as i32;
                for node in branch.nodes_with_tag(bank.tag()) {
                    match bank {
                        BankTag::LegacyTdc => tdc::decode_legacy_tdc(crate_id, node, records),
                        BankTag::Vtp => ancillary::decode_vtp(crate_id, node, records),
                        BankTag::HelicityScaler => ancillary::decode_helicity_scalers(crate_id, node, records),
                        BankTag::FlatScaler => ancillary::decode_flat_scalers(crate_id, node, records),
                        _ => {}
                    }
                }
            }
        }

        for branch in branches {
            for node in branch.nodes_with_tag(BankTag::Epics.tag()) {
                let text = ancillary::epics_text(node);
                for err in ancillary::parse_epics(&text, &mut self.event.epics) {
                    tracing::warn!(crate_id = branch.tag(), "{}", err);
                    self.event.diagnostics.push(err);
                }
            }
            for node in branch.nodes_with_tag(BankTag::HelicityDecoder.tag()) {
                match ancillary::decode_helicity_decoder(node) {
                    Some(record) => self.event.helicity_decoder = Some(record),
                    None => tracing::debug!(
                        crate_id = branch.tag(),
                        words = node.data_words(),
                        "Helicity decoder bank too short"
                    ),
                }
            }
        }
    }

    /// Packed FADC windows (57638) of one crate
    ///
    /// Only channels with more than `fadc_min_samples` samples are kept.
    /// `None` when the crate has no branch or a bank was corrupt.
    pub fn fadc_entries<N: EvioNode>(&mut self, branches: &[Branch<'_, N>], crate_id: u16) -> Option<Vec<FadcRecord>> {
        let branch = find_branch(branches, crate_id)?;
        let mut out = Vec::new();
        for node in branch.nodes_with_tag(BankTag::PackedFadc.tag()) {
            let before = out.len();
            if let Err(err) = pulse::decode_packed_fadc(crate_id as i32, node, self.config.fadc_min_samples, &mut out)
            {
                let decoded = out.len() - before;
                if !self.report(crate_id, node, err, decoded) {
                    return None;
                }
            }
        }
        Some(out)
    }

    /// Packed FADC windows of every crate in the event
    pub fn fadc_event_entries<N: EvioNode>(&mut self, nodes: &[N]) -> Vec<FadcRecord> {
        let branches = build_branches(nodes);
        let mut out = Vec::new();
        for branch in &branches {
            if let Some(entries) = self.fadc_entries(&branches, branch.tag()) {
                out.extend(entries);
            }
        }
        out
    }

    /// Raw sample buffers of the slot-group bank `tag` in one crate
    ///
    /// `None` when the crate has no branch, the tag has no composite schema,
    /// or a bank was corrupt.
    pub fn adc_entries_for_tag<N: EvioNode>(
        &mut self,
        branches: &[Branch<'_, N>],
        crate_id: u16,
        tag: u16,
    ) -> Option<Vec<FadcRecord>> {
        let branch = find_branch(branches, crate_id)?;
        let Some(bank) = BankTag::from_tag(tag).filter(|bank| bank.schema().is_some()) else {
            tracing::debug!(crate_id, tag, "Tag has no sample buffer layout");
            return None;
        };
        let mut out = Vec::new();
        for node in branch.nodes_with_tag(tag) {
            let before = out.len();
            if let Err(err) = pulse::raw_sample_buffers(crate_id as i32, node, bank, &mut out) {
                let decoded = out.len() - before;
                if !self.report(crate_id, node, err, decoded) {
                    return None;
                }
            }
        }
        Some(out)
    }

    pub fn run_number(&self) -> i32 {
        self.state.run_number
    }

    pub fn event_number(&self) -> i32 {
        self.state.event_number
    }

    pub fn unix_time(&self) -> i32 {
        self.state.unix_time
    }

    /// Synchronized TI timestamp, -1 when the crates disagreed
    pub fn timestamp(&self) -> i64 {
        self.state.timestamp
    }

    pub fn timestamp_errors(&self) -> u32 {
        self.state.timestamp_error_count
    }

    pub fn trigger_bits(&self) -> u64 {
        self.event.trigger_bits
    }

    pub fn trigger_words(&self) -> Option<[u32; 3]> {
        self.state.trigger_words
    }

    pub fn helicity_level3(&self) -> HelicityBit {
        self.state.helicity_level3
    }

    pub fn ti_master(&self) -> Option<u16> {
        self.state.ti_master
    }

    pub fn epics(&self) -> &BTreeMap<String, f32> {
        &self.event.epics
    }

    pub fn helicity_decoder(&self) -> Option<&HelicityDecoderRecord> {
        self.event.helicity_decoder.as_ref()
    }

    /// Problems met while decoding the last event
    pub fn diagnostics(&self) -> &[DecodeError] {
        &self.event.diagnostics
    }

    /// Log output of this event's timestamp mismatches
    pub fn desync_log(&self) -> &[DesyncLog] {
        &self.event.desync_log
    }
}

impl Default for CodaDecoder {
    fn default() -> Self {
        Self::with_defaults()
    }
}
