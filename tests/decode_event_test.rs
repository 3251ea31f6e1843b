//! Event-level decoder tests on synthetic bank trees
//!
//! Events are built directly as `RawNode` trees: one container per crate,
//! holding that crate's data banks.

use coda_decode::common::DecodeError;
use coda_decode::composite::CompositeData;
use coda_decode::config::DecoderConfig;
use coda_decode::decoder::catalog::FAMILY_A;
use coda_decode::decoder::{apv25, CodaDecoder, DesyncLog, HelicityBit};
use coda_decode::evio::{build_branches, ByteOrder, DataType, RawNode};
use rand::prelude::*;
use rand::rngs::StdRng;

fn words(tag: u16, words: &[u32]) -> RawNode {
    RawNode::from_words(tag, 0, DataType::UInt32, ByteOrder::Big, words)
}

fn composite(tag: u16, format: &str, data: &[u8]) -> RawNode {
    let payload = CompositeData::wrap(format, data, ByteOrder::Big);
    RawNode::leaf(tag, 0, DataType::Composite, ByteOrder::Big, payload)
}

fn crate_bank(crate_id: u16, children: Vec<RawNode>) -> RawNode {
    RawNode::container(crate_id, 0, children)
}

/// Family-A payload: slot header then (channel, samples) entries
fn family_a_data(slot: u8, time: u64, channels: &[(u8, Vec<i16>)]) -> Vec<u8> {
    let mut data = vec![slot];
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&time.to_be_bytes());
    data.extend_from_slice(&(channels.len() as u32).to_be_bytes());
    for (channel, samples) in channels {
        data.push(*channel);
        data.extend_from_slice(&(samples.len() as u32).to_be_bytes());
        for s in samples {
            data.extend_from_slice(&s.to_be_bytes());
        }
    }
    data
}

fn header_bank(run: u32, event: u32) -> RawNode {
    words(57615, &[0, run, event, 1_650_000_000])
}

fn ti_bank(timestamp: u64) -> RawNode {
    words(57610, &[0, 0, (timestamp >> 32) as u32, timestamp as u32])
}

const VMM3_HIT: u32 = 0x2152_C64B;

// =============================================================================
// Record decoding
// =============================================================================

#[test]
fn family_a_round_trip() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut decoder = CodaDecoder::with_defaults();

    for _ in 0..20 {
        let slot: u8 = rng.gen_range(1..=20);
        let time: u64 = rng.gen_range(0..1u64 << 48);
        let k = rng.gen_range(1..16);
        let channels: Vec<(u8, Vec<i16>)> = (0..k)
            .map(|ch| {
                let len = rng.gen_range(0..64);
                (ch as u8, (0..len).map(|_| rng.gen()).collect())
            })
            .collect();

        let bank = composite(57601, FAMILY_A, &family_a_data(slot, time, &channels));
        let records = decoder.decode_event(&[crate_bank(41, vec![bank])]);

        assert_eq!(records.len(), channels.len());
        for (record, (channel, samples)) in records.iter().zip(&channels) {
            assert_eq!(record.crate_id(), 41);
            assert_eq!(record.slot(), slot as i32);
            assert_eq!(record.channel(), *channel as i32);
            assert_eq!(&record.pulse[0].samples, samples);
            assert_eq!(record.timestamp, Some(time));
        }
        assert!(decoder.diagnostics().is_empty());
    }
}

#[test]
fn micromegas_packed_literal() {
    let mut data = vec![6u8];
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&1234u64.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&17i16.to_be_bytes());
    data.push(3);
    data.extend_from_slice(&[0x12, 0x34, 0x56]);
    let bank = composite(57640, "c,i,l,n(s,mc)", &data);

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&[crate_bank(70, vec![bank])]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.to_string(), "70/6/17");
    // 0x012 | (0x4 << 8) and 0x056 | (0x3 << 8)
    assert_eq!(records[0].adc[0].pulse, vec![0x412, 0x356]);
}

#[test]
fn vmm3_header_and_two_hits() {
    let second = (63u32 << 22) | (1 << 12) | (2 << 4);
    let bank = words(57653, &[0x3002_0000, VMM3_HIT, second]);

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&[crate_bank(80, vec![bank])]);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| (0..64).contains(&r.channel())));

    let first = &records[0].adc[0];
    assert_eq!(records[0].channel(), 5);
    assert_eq!((first.integral, first.time, first.height), (300, 100, 3));

    let second = &records[1].adc[0];
    assert_eq!(records[1].channel(), 63);
    assert_eq!((second.integral, second.time, second.height, second.pedestal), (1, 2, 0, 0));
}

#[test]
fn apv_common_mode_on_regular_slot() {
    let values: Vec<i16> = (0..128).map(|i| 400 + ((i * 37) % 101) as i16).collect();

    let mut sorted: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let cm = sorted[5..].iter().sum::<f64>() / 123.0;

    let mut samples = vec![1000i16, 1000, 1000];
    samples.extend([2000i16; 9]);
    samples.extend_from_slice(&values);
    let pack = |a: i16, b: i16| ((a as u16).swap_bytes() as u32) << 16 | (b as u16).swap_bytes() as u32;

    let mut stream = vec![0u32, (0x41_4443 << 8) | 2, 0];
    stream.extend(samples.chunks(2).map(|c| pack(c[0], c[1])));
    let raw: Vec<u32> = stream.iter().map(|w| w.swap_bytes()).collect();

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&[crate_bank(90, vec![words(57631, &raw)])]);
    assert_eq!(records.len(), 128);
    assert!((apv25::common_mode(2, &values) - cm).abs() < 1e-9);
    for (ich, record) in records.iter().enumerate() {
        assert_eq!(record.slot(), 2);
        assert_eq!(record.channel(), ich as i32);
        assert_eq!(record.adc.len(), 1);
        assert_eq!(record.adc[0].integral, (values[ich] as f64 - cm) as i32);
        assert_eq!(record.adc[0].pedestal, 0);
    }
}

#[test]
fn combine_banks_replace_legacy_bank() {
    let legacy = composite(57601, FAMILY_A, &family_a_data(3, 10, &[(1, vec![5, 6])]));
    let vmm3 = words(57653, &[0x3001_0000, VMM3_HIT]);

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&[crate_bank(12, vec![legacy, vmm3])]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].slot(), 30);
    assert!(records[0].pulse.is_empty());
}

// =============================================================================
// Bank failures
// =============================================================================

#[test]
fn corrupt_bank_is_dropped_other_crates_survive() {
    // Channel count stored as a plain int instead of a repetition marker
    let mut data = vec![1u8];
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&0u64.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    let corrupt = composite(57601, "c,i,l,i", &data);
    let good = composite(57601, FAMILY_A, &family_a_data(2, 8, &[(4, vec![1])]));
    let nodes = vec![crate_bank(1, vec![corrupt]), crate_bank(2, vec![good])];

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&nodes);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].crate_id(), 2);
    assert!(matches!(
        decoder.diagnostics(),
        [DecodeError::CorruptBank { crate_id: 1, tag: 57601, .. }]
    ));

    let branches = build_branches(&nodes);
    assert!(decoder.decode_crate(&branches, 1).is_none());
    assert_eq!(decoder.decode_crate(&branches, 2).map(|r| r.len()), Some(1));
}

#[test]
fn truncated_bank_keeps_decoded_channels() {
    let mut data = family_a_data(5, 77, &[(1, vec![10, 11])]);
    // Claim two channels; the second declares 5 samples but carries 2
    data[13..17].copy_from_slice(&2u32.to_be_bytes());
    data.push(2);
    data.extend_from_slice(&5u32.to_be_bytes());
    data.extend_from_slice(&20i16.to_be_bytes());
    data.extend_from_slice(&21i16.to_be_bytes());
    let bank = composite(57601, FAMILY_A, &data);

    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&[crate_bank(6, vec![bank])]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pulse[0].samples, vec![10, 11]);
    assert!(matches!(decoder.diagnostics(), [DecodeError::TruncatedBank { crate_id: 6, .. }]));
}

#[test]
fn malformed_header_uses_sentinels() {
    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&[crate_bank(3, vec![words(57615, &[0, 1])])]);
    assert_eq!(decoder.run_number(), 10);
    assert_eq!(decoder.event_number(), 1);
    assert!(matches!(decoder.diagnostics(), [DecodeError::MalformedHeader { crate_id: 3, .. }]));
}

// =============================================================================
// State and synchronization
// =============================================================================

#[test]
fn agreeing_timestamps_sync() {
    let nodes: Vec<RawNode> = (1..=3).map(|c| crate_bank(c, vec![ti_bank(100)])).collect();
    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&nodes);
    assert_eq!(decoder.timestamp(), 100);
    assert_eq!(decoder.timestamp_errors(), 0);
}

#[test]
fn disagreeing_timestamp_desyncs() {
    let nodes: Vec<RawNode> = [100, 100, 150]
        .iter()
        .enumerate()
        .map(|(i, &ts)| crate_bank(i as u16 + 1, vec![ti_bank(ts)]))
        .collect();
    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&nodes);
    assert_eq!(decoder.timestamp(), -1);
    assert_eq!(decoder.timestamp_errors(), 1);
    assert!(matches!(
        decoder.diagnostics(),
        [DecodeError::DesyncTimestamp { crate_id: 3, reported: 150, .. }]
    ));
}

#[test]
fn master_crate_from_current_event_gets_extra_tick() {
    let nodes = vec![
        crate_bank(1, vec![header_bank(5, 9), ti_bank(101)]),
        crate_bank(2, vec![ti_bank(100)]),
    ];
    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&nodes);
    assert_eq!(decoder.ti_master(), Some(1));
    assert_eq!(decoder.timestamp(), 100);
}

#[test]
fn desync_warnings_stop_after_cap() {
    let config = DecoderConfig {
        max_timestamp_warnings: 2,
        ..Default::default()
    };
    let mut decoder = CodaDecoder::new(config);
    let nodes = vec![crate_bank(1, vec![ti_bank(10)]), crate_bank(2, vec![ti_bank(20)])];
    let mut log = Vec::new();
    for _ in 0..5 {
        decoder.decode_event(&nodes);
        assert_eq!(decoder.diagnostics().len(), 1);
        log.extend_from_slice(decoder.desync_log());
    }
    assert_eq!(decoder.timestamp_errors(), 5);
    assert_eq!(
        log,
        vec![
            DesyncLog::Warned,
            DesyncLog::Warned,
            DesyncLog::CapReached,
            DesyncLog::Silent,
            DesyncLog::Silent,
        ]
    );

    decoder.decode_event(&[crate_bank(1, vec![ti_bank(30)]), crate_bank(2, vec![ti_bank(30)])]);
    assert!(decoder.desync_log().is_empty());
    assert_eq!(decoder.timestamp(), 30);
}

#[test]
fn tolerance_from_config() {
    let config = DecoderConfig {
        timestamp_tolerance: 10,
        ..Default::default()
    };
    let mut decoder = CodaDecoder::new(config);
    decoder.decode_event(&[crate_bank(1, vec![ti_bank(10)]), crate_bank(2, vec![ti_bank(20)])]);
    assert_eq!(decoder.timestamp(), 10);
}

#[test]
fn state_carries_over_but_trigger_bits_reset() {
    let mut decoder = CodaDecoder::with_defaults();
    let event_a = vec![crate_bank(
        1,
        vec![header_bank(7, 42), words(57610, &[0, 0, 0, 0, 0x0000_00ff])],
    )];
    decoder.decode_event(&event_a);
    assert_eq!(decoder.run_number(), 7);
    assert_eq!(decoder.trigger_bits(), 0xff);
    assert_eq!(decoder.helicity_level3(), HelicityBit::DoesNotExist);

    let bank = composite(57601, FAMILY_A, &family_a_data(1, 5, &[(0, vec![1])]));
    let event_b = vec![crate_bank(1, vec![bank])];
    let records = decoder.decode_event(&event_b);
    assert_eq!(records.len(), 1);
    assert_eq!(decoder.run_number(), 7);
    assert_eq!(decoder.event_number(), 42);
    assert_eq!(decoder.unix_time(), 1_650_000_000);
    assert_eq!(decoder.trigger_bits(), 0);
}

// =============================================================================
// Ancillary banks
// =============================================================================

#[test]
fn epics_values_are_per_event() {
    let text = b"1.5 beam_current\nNaNish torus\n".to_vec();
    let epics = RawNode::leaf(57620, 0, DataType::CharStar8, ByteOrder::Big, text);

    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&[crate_bank(31, vec![epics])]);
    assert_eq!(decoder.epics().get("beam_current"), Some(&1.5));
    assert_eq!(decoder.epics().len(), 1);
    assert!(matches!(
        decoder.diagnostics(),
        [DecodeError::NonNumericSideChannel { row }] if row == "NaNish torus"
    ));

    decoder.decode_event(&[crate_bank(31, vec![ti_bank(1)])]);
    assert!(decoder.epics().is_empty());
}

#[test]
fn helicity_decoder_absent_or_short_is_none() {
    let mut decoder = CodaDecoder::with_defaults();
    decoder.decode_event(&[crate_bank(1, vec![ti_bank(1)])]);
    assert!(decoder.helicity_decoder().is_none());

    decoder.decode_event(&[crate_bank(1, vec![words(57651, &[0; 10])])]);
    assert!(decoder.helicity_decoder().is_none());

    let mut board = vec![0u32; 19];
    board[5] = 0x1234;
    decoder.decode_event(&[crate_bank(1, vec![words(57651, &board)])]);
    assert_eq!(decoder.helicity_decoder().map(|h| h.helicity_seed), Some(0x1234));
}

#[test]
fn scalers_and_vtp_records() {
    let scaler = (1u32 << 31) | (1 << 24) | 500;
    let nodes = vec![crate_bank(
        64,
        vec![words(57637, &[scaler]), words(57634, &[0xdead_beef])],
    )];
    let mut decoder = CodaDecoder::with_defaults();
    let records = decoder.decode_event(&nodes);
    assert_eq!(records.len(), 2);
    // VTP pass runs before the scaler passes
    assert_eq!(records[0].vtp[0].word, 0xdead_beef);
    assert_eq!(records[0].key.to_string(), "64/0/0");
    assert_eq!(records[1].scaler[0].value, 500);
    assert_eq!(records[1].scaler[0].helicity, 1);
}

#[test]
fn packed_fadc_on_request() {
    // slot 3, one channel with 20 samples and one with 2
    let mut data = vec![3u8, 2, 7, 20];
    for s in 0..20i16 {
        data.extend_from_slice(&s.to_be_bytes());
    }
    data.extend_from_slice(&[8, 2, 0, 1, 0, 2]);
    let fadc = composite(57638, "c,m(c,ms)", &data);
    let nodes = vec![crate_bank(15, vec![fadc])];

    let mut decoder = CodaDecoder::with_defaults();
    assert!(decoder.decode_event(&nodes).is_empty());

    let entries = decoder.fadc_event_entries(&nodes);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key.to_string(), "15/3/7");
    assert_eq!(entries[0].samples, (0..20).collect::<Vec<i16>>());
}
