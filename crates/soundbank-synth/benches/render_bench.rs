//! Criterion benchmarks for soundbank-synth
//!
//! Run with: cargo bench -p soundbank-synth

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use soundbank_config::SynthConfig;
use soundbank_sf2::fixture::{FontBuilder, SampleSpec, ZoneSpec};
use soundbank_sf2::{GeneratorType, SoundFont};
use soundbank_synth::{EnvelopeTimes, MidiEvent, RenderBuffers, Synthesizer, VolumeEnvelope};

const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];
const POLYPHONY: &[u8] = &[1, 8, 32];

/// A looping sine with a filter and vibrato so the full voice path runs.
fn bench_font() -> Vec<u8> {
    let mut b = FontBuilder::new();
    let s = b.sample(SampleSpec::sine("sine", 44_100));
    let i = b.instrument(
        "Lead",
        vec![
            ZoneSpec::new()
                .generator(GeneratorType::SampleModes, 1)
                .generator(GeneratorType::InitialFilterFc, 9000)
                .generator(GeneratorType::VibLfoToPitch, 20)
                .sample(s),
        ],
    );
    b.preset("Lead", 0, 0, vec![ZoneSpec::new().instrument(i)]);
    b.build()
}

// ============================================================================
// Parsing
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let bytes = bench_font();
    c.bench_function("SoundFont/from_bytes", |b| {
        b.iter(|| black_box(SoundFont::from_bytes(black_box(&bytes))))
    });
}

// ============================================================================
// Envelope
// ============================================================================

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("VolumeEnvelope");

    for &block_size in BLOCK_SIZES {
        let mut env = VolumeEnvelope::new(48000.0);
        env.start(EnvelopeTimes {
            attack: 0.01,
            decay: 0.1,
            sustain_level: 0.5,
            ..EnvelopeTimes::default()
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            &block_size,
            |b, &size| {
                b.iter(|| {
                    let mut sum = 0.0f32;
                    for _ in 0..size {
                        sum += env.advance();
                    }
                    black_box(sum)
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// Synthesizer
// ============================================================================

fn bench_render(c: &mut Criterion) {
    let font = Arc::new(SoundFont::from_bytes(&bench_font()).unwrap());
    let mut group = c.benchmark_group("Synthesizer_render");

    for &voices in POLYPHONY {
        for &block_size in BLOCK_SIZES {
            let mut synth = Synthesizer::new(Arc::clone(&font), SynthConfig::default()).unwrap();
            for n in 0..voices {
                synth.handle(MidiEvent::NoteOn {
                    channel: n % 8,
                    key: 40 + n,
                    velocity: 100,
                });
            }
            let mut block = RenderBuffers::new(block_size);

            group.bench_with_input(
                BenchmarkId::new(format!("{voices}_voices"), block_size),
                &block_size,
                |b, _| {
                    b.iter(|| {
                        block.clear();
                        synth.render(&mut block);
                        black_box(block.left()[0])
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_note_churn(c: &mut Criterion) {
    let font = Arc::new(SoundFont::from_bytes(&bench_font()).unwrap());
    let config = SynthConfig::default().with_max_voices(Some(16));
    let mut synth = Synthesizer::new(font, config).unwrap();
    let mut block = RenderBuffers::new(256);
    let mut key = 0u8;

    c.bench_function("Synthesizer/note_churn", |b| {
        b.iter(|| {
            key = (key + 7) % 128;
            synth.handle(MidiEvent::NoteOn {
                channel: 0,
                key,
                velocity: 100,
            });
            synth.handle(MidiEvent::NoteOff { channel: 0, key });
            block.clear();
            synth.render(&mut block);
            black_box(synth.voice_count())
        })
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_envelope,
    bench_render,
    bench_note_churn
);
criterion_main!(benches);
