//! In-memory SF2 writer for tests and benchmarks.
//!
//! Only compiled with the `test-fixtures` feature.
//!
//! ```rust,ignore
//! let mut b = FontBuilder::new();
//! let s = b.sample(SampleSpec::sine("sine", 2000));
//! let i = b.instrument("Sine", vec![ZoneSpec::new().sample(s)]);
//! b.preset("Sine", 0, 0, vec![ZoneSpec::new().instrument(i)]);
//! let font = SoundFont::from_bytes(&b.build())?;
//! ```

use crate::generator::{GeneratorType, Range8};
use crate::hydra::ModulatorRecord;
use crate::sample::SampleKind;

/// Zero points written after every sample, as the format requires.
const SAMPLE_GAP: usize = 46;

/// A sample to embed in the fixture.
#[derive(Clone, Debug)]
pub struct SampleSpec {
    /// Name.
    pub name: String,
    /// PCM points.
    pub data: Vec<i16>,
    /// Loop points relative to the first point.
    pub loop_points: (u32, u32),
    /// Rate in Hz.
    pub sample_rate: u32,
    /// Root key.
    pub root_key: u8,
    /// Pitch correction in cents.
    pub correction: i8,
    /// Channel role.
    pub kind: SampleKind,
    /// Linked sample index.
    pub link: u16,
}

impl SampleSpec {
    /// A mono 44.1 kHz sample at root key 60 with no loop.
    pub fn new(name: &str, data: Vec<i16>) -> Self {
        Self {
            name: name.to_string(),
            data,
            loop_points: (0, 0),
            sample_rate: 44_100,
            root_key: 60,
            correction: 0,
            kind: SampleKind::Mono,
            link: 0,
        }
    }

    /// A looped sine wave of `len` points with a 100-point period.
    pub fn sine(name: &str, len: usize) -> Self {
        let data = (0..len)
            .map(|i| {
                let phase = i as f32 / 100.0 * core::f32::consts::TAU;
                (phase.sin() * 16_000.0) as i16
            })
            .collect();
        let mut spec = Self::new(name, data);
        let end = (len / 100 * 100) as u32;
        spec.loop_points = (0, end);
        spec
    }

    /// Set the rate.
    pub fn rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the root key.
    pub fn root(mut self, key: u8) -> Self {
        self.root_key = key;
        self
    }

    /// Set the loop points (relative to the sample start).
    pub fn looped(mut self, start: u32, end: u32) -> Self {
        self.loop_points = (start, end);
        self
    }

    /// Set the channel role and link.
    pub fn stereo(mut self, kind: SampleKind, link: u16) -> Self {
        self.kind = kind;
        self.link = link;
        self
    }
}

/// A zone to embed in the fixture.
#[derive(Clone, Debug, Default)]
pub struct ZoneSpec {
    key_range: Option<Range8>,
    vel_range: Option<Range8>,
    generators: Vec<(GeneratorType, i16)>,
    modulators: Vec<ModulatorRecord>,
    target: Option<(GeneratorType, u16)>,
}

impl ZoneSpec {
    /// An empty zone (global unless a target is added).
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a key range.
    pub fn keys(mut self, lo: u8, hi: u8) -> Self {
        self.key_range = Some(Range8 { lo, hi });
        self
    }

    /// Restrict to a velocity range.
    pub fn vels(mut self, lo: u8, hi: u8) -> Self {
        self.vel_range = Some(Range8 { lo, hi });
        self
    }

    /// Add a generator.
    pub fn generator(mut self, kind: GeneratorType, amount: i16) -> Self {
        self.generators.push((kind, amount));
        self
    }

    /// Add a raw modulator record.
    pub fn modulator(mut self, record: ModulatorRecord) -> Self {
        self.modulators.push(record);
        self
    }

    /// Point an instrument zone at a sample.
    pub fn sample(mut self, index: u16) -> Self {
        self.target = Some((GeneratorType::SampleId, index));
        self
    }

    /// Point a preset zone at an instrument.
    pub fn instrument(mut self, index: u16) -> Self {
        self.target = Some((GeneratorType::Instrument, index));
        self
    }

    // Range generators first and the terminal last, as the format requires.
    fn ordered_generators(&self) -> Vec<(u16, i16)> {
        let mut out = Vec::new();
        if let Some(r) = self.key_range {
            out.push((GeneratorType::KeyRange as u16, r.to_amount()));
        }
        if let Some(r) = self.vel_range {
            out.push((GeneratorType::VelRange as u16, r.to_amount()));
        }
        out.extend(self.generators.iter().map(|&(k, a)| (k as u16, a)));
        if let Some((k, index)) = self.target {
            out.push((k as u16, index as i16));
        }
        out
    }
}

/// Builds a complete SF2 byte image.
#[derive(Clone, Debug)]
pub struct FontBuilder {
    name: String,
    samples: Vec<SampleSpec>,
    instruments: Vec<(String, Vec<ZoneSpec>)>,
    presets: Vec<(String, u16, u16, Vec<ZoneSpec>)>,
}

impl Default for FontBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBuilder {
    /// An empty bank named `fixture`.
    pub fn new() -> Self {
        Self {
            name: "fixture".to_string(),
            samples: Vec::new(),
            instruments: Vec::new(),
            presets: Vec::new(),
        }
    }

    /// Add a sample; returns its index.
    pub fn sample(&mut self, spec: SampleSpec) -> u16 {
        self.samples.push(spec);
        (self.samples.len() - 1) as u16
    }

    /// Add an instrument; returns its index.
    pub fn instrument(&mut self, name: &str, zones: Vec<ZoneSpec>) -> u16 {
        self.instruments.push((name.to_string(), zones));
        (self.instruments.len() - 1) as u16
    }

    /// Add a preset.
    pub fn preset(&mut self, name: &str, bank: u16, program: u16, zones: Vec<ZoneSpec>) {
        self.presets.push((name.to_string(), bank, program, zones));
    }

    /// Serialize to a RIFF `sfbk` image.
    pub fn build(&self) -> Vec<u8> {
        let mut ifil = Vec::new();
        put_u16(&mut ifil, 2);
        put_u16(&mut ifil, 1);
        let mut inam = self.name.as_bytes().to_vec();
        inam.push(0);
        let info = list(b"INFO", &[chunk(b"ifil", &ifil), chunk(b"INAM", &inam)]);

        let mut pcm = Vec::new();
        let mut shdr = Vec::new();
        let mut point = 0u32;
        for s in &self.samples {
            let start = point;
            let end = start + s.data.len() as u32;
            for v in &s.data {
                pcm.extend_from_slice(&v.to_le_bytes());
            }
            pcm.extend(core::iter::repeat_n(0u8, SAMPLE_GAP * 2));
            point = end + SAMPLE_GAP as u32;

            put_name(&mut shdr, &s.name);
            put_u32(&mut shdr, start);
            put_u32(&mut shdr, end);
            put_u32(&mut shdr, start + s.loop_points.0);
            put_u32(&mut shdr, start + s.loop_points.1);
            put_u32(&mut shdr, s.sample_rate);
            shdr.push(s.root_key);
            shdr.push(s.correction as u8);
            put_u16(&mut shdr, s.link);
            put_u16(&mut shdr, s.kind.to_raw());
        }
        put_name(&mut shdr, "EOS");
        shdr.extend_from_slice(&[0u8; 26]);
        let sdta = list(b"sdta", &[chunk(b"smpl", &pcm)]);

        let mut inst = Vec::new();
        let mut ibag = Bags::default();
        for (name, zones) in &self.instruments {
            put_name(&mut inst, name);
            put_u16(&mut inst, ibag.count);
            ibag.push_all(zones);
        }
        put_name(&mut inst, "EOI");
        put_u16(&mut inst, ibag.count);

        let mut phdr = Vec::new();
        let mut pbag = Bags::default();
        for (name, bank, program, zones) in &self.presets {
            put_name(&mut phdr, name);
            put_u16(&mut phdr, *program);
            put_u16(&mut phdr, *bank);
            put_u16(&mut phdr, pbag.count);
            phdr.extend_from_slice(&[0u8; 12]);
            pbag.push_all(zones);
        }
        put_name(&mut phdr, "EOP");
        phdr.extend_from_slice(&[0u8; 4]);
        put_u16(&mut phdr, pbag.count);
        phdr.extend_from_slice(&[0u8; 12]);

        let (pbag, pmod, pgen) = pbag.finish();
        let (ibag, imod, igen) = ibag.finish();
        let pdta = list(
            b"pdta",
            &[
                chunk(b"phdr", &phdr),
                chunk(b"pbag", &pbag),
                chunk(b"pmod", &pmod),
                chunk(b"pgen", &pgen),
                chunk(b"inst", &inst),
                chunk(b"ibag", &ibag),
                chunk(b"imod", &imod),
                chunk(b"igen", &igen),
                chunk(b"shdr", &shdr),
            ],
        );

        let mut body = b"sfbk".to_vec();
        body.extend(info);
        body.extend(sdta);
        body.extend(pdta);
        chunk(b"RIFF", &body)
    }
}

/// Bag, modulator and generator tables under construction.
#[derive(Default)]
struct Bags {
    count: u16,
    bags: Vec<u8>,
    mods: Vec<u8>,
    gens: Vec<u8>,
    mod_count: u16,
    gen_count: u16,
}

impl Bags {
    fn push_all(&mut self, zones: &[ZoneSpec]) {
        for zone in zones {
            put_u16(&mut self.bags, self.gen_count);
            put_u16(&mut self.bags, self.mod_count);
            self.count += 1;
            for (op, amount) in zone.ordered_generators() {
                put_u16(&mut self.gens, op);
                self.gens.extend_from_slice(&amount.to_le_bytes());
                self.gen_count += 1;
            }
            for m in &zone.modulators {
                put_u16(&mut self.mods, m.source);
                put_u16(&mut self.mods, m.destination);
                self.mods.extend_from_slice(&m.amount.to_le_bytes());
                put_u16(&mut self.mods, m.amount_source);
                put_u16(&mut self.mods, m.transform);
                self.mod_count += 1;
            }
        }
    }

    fn finish(mut self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        put_u16(&mut self.bags, self.gen_count);
        put_u16(&mut self.bags, self.mod_count);
        self.mods.extend_from_slice(&[0u8; 10]);
        self.gens.extend_from_slice(&[0u8; 4]);
        (self.bags, self.mods, self.gens)
    }
}

/// Serialize one chunk, padding odd bodies.
pub fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);
    out.extend_from_slice(id);
    put_u32(&mut out, body.len() as u32);
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// Serialize a `LIST` chunk of the given form type.
pub fn list(form: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut body = form.to_vec();
    for child in children {
        body.extend_from_slice(child);
    }
    chunk(b"LIST", &body)
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 20];
    let bytes = name.as_bytes();
    let n = bytes.len().min(19);
    field[..n].copy_from_slice(&bytes[..n]);
    out.extend_from_slice(&field);
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// The two-preset bank used throughout the test suites: `Piano` at
/// bank 0 program 0 and `Drums` at bank 128 program 0.
pub fn piano_and_drums() -> Vec<u8> {
    let mut b = FontBuilder::new();
    let tone = b.sample(SampleSpec::sine("tone", 4410));
    let hit = b.sample(SampleSpec::new("hit", vec![8000; 2205]));
    let piano = b.instrument("Piano", vec![ZoneSpec::new().sample(tone)]);
    let drums = b.instrument("Drums", vec![ZoneSpec::new().sample(hit)]);
    b.preset("Piano", 0, 0, vec![ZoneSpec::new().instrument(piano)]);
    b.preset("Drums", 128, 0, vec![ZoneSpec::new().instrument(drums)]);
    b.build()
}
