//! Integration tests for soundbank-sf2.
//!
//! Tests cover whole-file loading, structural failures, reference
//! validation, preset lookup and layer resolution.

use soundbank_sf2::fixture::{FontBuilder, SampleSpec, ZoneSpec, chunk, list, piano_and_drums};
use soundbank_sf2::{
    GeneratorType, MatchKind, ModulatorRecord, SampleKind, Sf2Error, SoundFont,
};

fn name_of(font: &SoundFont, index: usize) -> &str {
    &font.presets()[index].name
}

// ---------------------------------------------------------------------------
// 1. Loading
// ---------------------------------------------------------------------------

#[test]
fn loads_piano_and_drums() {
    let font = SoundFont::from_bytes(&piano_and_drums()).unwrap();
    assert_eq!(font.presets().len(), 2);
    assert_eq!(font.instruments().len(), 2);
    assert_eq!(font.samples().len(), 2);
    // Each sample is followed by 46 zero points.
    assert_eq!(font.pcm().len(), 4410 + 46 + 2205 + 46);
}

#[test]
fn from_reader_matches_from_bytes() {
    let bytes = piano_and_drums();
    let a = SoundFont::from_bytes(&bytes).unwrap();
    let b = SoundFont::from_reader(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(a.presets(), b.presets());
    assert_eq!(a.samples(), b.samples());
}

#[test]
fn sample_addresses_index_shared_pcm() {
    let font = SoundFont::from_bytes(&piano_and_drums()).unwrap();
    let hit = &font.samples()[1];
    assert_eq!(hit.start, 4410 + 46);
    assert!(font.pcm()[hit.range()].iter().all(|&v| v == 8000));
}

// ---------------------------------------------------------------------------
// 2. Scenario: percussion fallback
// ---------------------------------------------------------------------------

#[test]
fn piano_resolves_exactly() {
    let font = SoundFont::from_bytes(&piano_and_drums()).unwrap();
    let m = font.resolve_preset(0, 0);
    assert_eq!(name_of(&font, m.index), "Piano");
    assert_eq!(m.kind, MatchKind::Exact);
}

#[test]
fn percussion_ignores_program() {
    let font = SoundFont::from_bytes(&piano_and_drums()).unwrap();
    let m = font.resolve_preset(128, 5);
    assert_eq!(name_of(&font, m.index), "Drums");
    assert_eq!(m.kind, MatchKind::AnyPercussion);
}

#[test]
fn unknown_bank_falls_back_to_first_preset() {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 200));
    let i = b.instrument("i", vec![ZoneSpec::new().sample(s)]);
    b.preset("Organ", 0, 16, vec![ZoneSpec::new().instrument(i)]);
    b.preset("Bass", 0, 33, vec![ZoneSpec::new().instrument(i)]);
    let font = SoundFont::from_bytes(&b.build()).unwrap();

    let m = font.resolve_preset(0, 100);
    assert!(m.is_fallback());
    assert_eq!(name_of(&font, m.index), "Organ");

    // No percussion presets at all: percussion requests also fall back.
    assert!(font.resolve_preset(128, 0).is_fallback());
}

// ---------------------------------------------------------------------------
// 3. Structural failures
// ---------------------------------------------------------------------------

#[test]
fn truncated_file_is_malformed() {
    let bytes = piano_and_drums();
    for cut in [4, 11, 40, bytes.len() / 2, bytes.len() - 1] {
        let err = SoundFont::from_bytes(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, Sf2Error::MalformedContainer(_)),
            "cut at {cut}: got {err:?}"
        );
    }
}

#[test]
fn wrong_form_type_is_malformed() {
    let mut bytes = piano_and_drums();
    bytes[8..12].copy_from_slice(b"WAVE");
    let err = SoundFont::from_bytes(&bytes).unwrap_err();
    assert!(err.to_string().contains("sfbk"), "got {err}");
}

#[test]
fn missing_pdta_is_malformed() {
    let body = [b"sfbk".to_vec(), list(b"sdta", &[chunk(b"smpl", &[0; 8])])].concat();
    let err = SoundFont::from_bytes(&chunk(b"RIFF", &body)).unwrap_err();
    assert!(err.to_string().contains("pdta"), "got {err}");
}

#[test]
fn empty_preset_table_is_malformed() {
    let mut b = FontBuilder::new();
    b.sample(SampleSpec::sine("s", 100));
    let err = SoundFont::from_bytes(&b.build()).unwrap_err();
    assert!(matches!(err, Sf2Error::MalformedContainer(_)), "got {err:?}");
}

#[test]
fn dangling_sample_reference_is_broken() {
    let mut b = FontBuilder::new();
    b.sample(SampleSpec::sine("s", 100));
    let i = b.instrument("i", vec![ZoneSpec::new().sample(7)]);
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    let err = SoundFont::from_bytes(&b.build()).unwrap_err();
    assert!(
        matches!(err, Sf2Error::BrokenReference { table: "shdr", index: 7, len: 1 }),
        "got {err:?}"
    );
}

#[test]
fn dangling_instrument_reference_is_broken() {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 100));
    b.instrument("i", vec![ZoneSpec::new().sample(s)]);
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(3)]);
    let err = SoundFont::from_bytes(&b.build()).unwrap_err();
    assert!(
        matches!(err, Sf2Error::BrokenReference { table: "inst", .. }),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// 4. Zones, generators and modulators
// ---------------------------------------------------------------------------

#[test]
fn velocity_layers_select_by_velocity() {
    let mut b = FontBuilder::new();
    let soft = b.sample(SampleSpec::sine("soft", 200));
    let loud = b.sample(SampleSpec::sine("loud", 200));
    let i = b.instrument(
        "i",
        vec![
            ZoneSpec::new().vels(0, 63).sample(soft),
            ZoneSpec::new().vels(64, 127).sample(loud),
        ],
    );
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    let font = SoundFont::from_bytes(&b.build()).unwrap();

    assert_eq!(font.layers(0, 60, 20)[0].sample.name, "soft");
    assert_eq!(font.layers(0, 60, 100)[0].sample.name, "loud");
}

#[test]
fn global_zones_are_exposed_on_layers() {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 200));
    let i = b.instrument(
        "i",
        vec![
            ZoneSpec::new().generator(GeneratorType::ReleaseVolEnv, 1200),
            ZoneSpec::new().sample(s),
        ],
    );
    b.preset(
        "p",
        0,
        0,
        vec![
            ZoneSpec::new().generator(GeneratorType::CoarseTune, 12),
            ZoneSpec::new().instrument(i),
        ],
    );
    let font = SoundFont::from_bytes(&b.build()).unwrap();
    let layer = font.layers(0, 60, 100)[0];

    let inst_global = layer.instrument_global.unwrap();
    assert_eq!(inst_global.generator(GeneratorType::ReleaseVolEnv), Some(1200));
    let preset_global = layer.preset_global.unwrap();
    assert_eq!(preset_global.generator(GeneratorType::CoarseTune), Some(12));
    assert_eq!(layer.instrument_zone.generator(GeneratorType::ReleaseVolEnv), None);
}

#[test]
fn zone_modulators_are_decoded() {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 200));
    let record = ModulatorRecord {
        source: 0x0081,
        destination: GeneratorType::VibLfoToPitch as u16,
        amount: 100,
        amount_source: 0,
        transform: 0,
    };
    let i = b.instrument("i", vec![ZoneSpec::new().modulator(record).sample(s)]);
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    let font = SoundFont::from_bytes(&b.build()).unwrap();

    let zone = font.layers(0, 60, 100)[0].instrument_zone;
    assert_eq!(zone.modulators.len(), 1);
    assert_eq!(zone.modulators[0].amount, 100);
    assert!(zone.modulators[0].source.is_cc_number(1));
}

#[test]
fn stereo_pair_is_linked() {
    let mut b = FontBuilder::new();
    let left = b.sample(SampleSpec::sine("L", 200).stereo(SampleKind::Left, 1));
    let right = b.sample(SampleSpec::sine("R", 200).stereo(SampleKind::Right, 0));
    let i = b.instrument(
        "i",
        vec![ZoneSpec::new().sample(left), ZoneSpec::new().sample(right)],
    );
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    let font = SoundFont::from_bytes(&b.build()).unwrap();

    assert_eq!(font.samples()[0].link, Some(1));
    assert_eq!(font.samples()[1].kind, SampleKind::Right);
    assert_eq!(font.layers(0, 60, 100).len(), 2);
}

#[test]
fn degenerate_loop_is_disabled_not_fatal() {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 200).looped(150, 50));
    let i = b.instrument("i", vec![ZoneSpec::new().sample(s)]);
    b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    let font = SoundFont::from_bytes(&b.build()).unwrap();
    assert_eq!(font.samples()[0].loop_range(), None);
}
