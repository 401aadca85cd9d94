//! Property-based tests for the SF2 parser.
//!
//! The parser must reject corrupt input with an error rather than panic, and
//! every preset of a well-formed bank must reach a sample for keys and
//! velocities inside its zones.

use proptest::prelude::*;
use soundbank_sf2::fixture::{FontBuilder, SampleSpec, ZoneSpec, piano_and_drums};
use soundbank_sf2::{ChunkReader, SoundFont};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Arbitrary bytes never panic the chunk reader.
    #[test]
    fn chunk_reader_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut reader = ChunkReader::new(&data);
        while let Ok(chunk) = reader.read_chunk() {
            let mut inner = ChunkReader::nested(&chunk);
            let _ = inner.read_fourcc();
            let _ = inner.read_chunk();
        }
    }

    /// Flipping any byte of a valid bank yields a bank or an error, never a panic.
    #[test]
    fn corrupted_bank_never_panics(index in any::<prop::sample::Index>(), value in any::<u8>()) {
        let mut bytes = piano_and_drums();
        let i = index.index(bytes.len());
        bytes[i] = value;
        let _ = SoundFont::from_bytes(&bytes);
    }

    /// Truncating a valid bank anywhere is reported as an error.
    #[test]
    fn truncated_bank_is_rejected(index in any::<prop::sample::Index>()) {
        let bytes = piano_and_drums();
        let cut = index.index(bytes.len());
        prop_assert!(SoundFont::from_bytes(&bytes[..cut]).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every preset reaches at least one sample for any key/velocity inside
    /// its (intersecting) zone ranges.
    #[test]
    fn presets_resolve_inside_their_ranges(
        splits in prop::collection::vec((0u8..=127, 0u8..=127), 1..6),
        key in 0u8..=127,
        vel in 1u8..=127,
    ) {
        let mut b = FontBuilder::new();
        let mut zones = Vec::new();
        for (n, &(a, c)) in splits.iter().enumerate() {
            let s = b.sample(SampleSpec::sine(&format!("s{n}"), 200));
            zones.push(ZoneSpec::new().keys(a.min(c), a.max(c)).sample(s));
        }
        let i = b.instrument("split", zones);
        b.preset("p", 0, 0, vec![ZoneSpec::new().instrument(i)]);
        let font = SoundFont::from_bytes(&b.build()).unwrap();

        let covered = splits.iter().any(|&(a, c)| a.min(c) <= key && key <= a.max(c));
        let layers = font.layers(0, key, vel);
        prop_assert_eq!(!layers.is_empty(), covered, "key {} splits {:?}", key, splits);
    }
}
