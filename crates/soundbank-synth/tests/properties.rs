//! Property-based tests for the synthesis engine.

use std::sync::Arc;

use proptest::prelude::*;
use soundbank_config::SynthConfig;
use soundbank_sf2::fixture::{FontBuilder, SampleSpec, ZoneSpec};
use soundbank_sf2::{GeneratorType, SoundFont};
use soundbank_synth::units::{seconds_to_timecents, timecents_to_seconds};
use soundbank_synth::{MidiEvent, RenderBuffers, Synthesizer};

#[derive(Clone, Debug)]
enum Op {
    On(u8),
    Off(u8),
    Render,
}

/// Keys 36..=39 share exclusive class 2; key 60 is unclassed.
fn choke_font() -> Vec<u8> {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("s", 2400));
    let i = b.instrument(
        "Kit",
        vec![
            ZoneSpec::new()
                .keys(36, 39)
                .generator(GeneratorType::SampleModes, 1)
                .generator(GeneratorType::ExclusiveClass, 2)
                .sample(s),
            ZoneSpec::new()
                .keys(60, 60)
                .generator(GeneratorType::SampleModes, 1)
                .sample(s),
        ],
    );
    b.preset("Kit", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    b.build()
}

fn key_strategy() -> impl Strategy<Value = u8> {
    prop_oneof![36u8..=39, Just(60u8)]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        key_strategy().prop_map(Op::On),
        key_strategy().prop_map(Op::Off),
        Just(Op::Render),
    ]
}

fn run(synth: &mut Synthesizer, op: &Op, block: &mut RenderBuffers) {
    match *op {
        Op::On(key) => synth.handle(MidiEvent::NoteOn {
            channel: 0,
            key,
            velocity: 100,
        }),
        Op::Off(key) => synth.handle(MidiEvent::NoteOff { channel: 0, key }),
        Op::Render => {
            block.clear();
            synth.render(block);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Timecents survive a round trip through seconds.
    #[test]
    fn timecents_round_trip(tc in -12000.0f64..8000.0) {
        let back = seconds_to_timecents(timecents_to_seconds(tc));
        prop_assert!((back - tc).abs() < 1e-6, "{tc} -> {back}");
    }

    /// At most one note of an exclusive class is ever sounding.
    #[test]
    fn exclusive_class_holds_one_note(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let font = Arc::new(SoundFont::from_bytes(&choke_font()).unwrap());
        let mut synth = Synthesizer::new(font, SynthConfig::default()).unwrap();
        let mut block = RenderBuffers::new(128);
        for op in &ops {
            run(&mut synth, op, &mut block);
            let classed = synth
                .channel(0)
                .unwrap()
                .notes()
                .filter(|n| n.exclusive_classes().contains(&2))
                .count();
            prop_assert!(classed <= 1, "{classed} notes in class 2 after {op:?}");
        }
    }

    /// The voice budget is never exceeded after a note-on.
    #[test]
    fn voice_budget_is_respected(
        max in 2usize..8,
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let font = Arc::new(SoundFont::from_bytes(&choke_font()).unwrap());
        let config = SynthConfig::default().with_max_voices(Some(max));
        let mut synth = Synthesizer::new(font, config).unwrap();
        let mut block = RenderBuffers::new(128);
        for op in &ops {
            run(&mut synth, op, &mut block);
            prop_assert!(synth.voice_count() <= max);
        }
    }
}
