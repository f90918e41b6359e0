//! Property tests: tapes built by `TapeWriter` extract back to exactly the
//! blocks that went in.

use castape::block::{BinaryHeader, BlockKind, BlockMeta, TapeBlock};
use castape::marker::{ends_with_marker, FRAME_MARKER};
use castape::{extract, ExtractOptions, TapeWriter};
use proptest::prelude::*;
use std::io::Cursor;

#[derive(Debug, Clone)]
enum Planned {
    Ascii { name: String, text: Vec<u8> },
    Program { name: String, body: Vec<u8> },
    Binary { name: String, start: u16, exec: u16, image: Vec<u8> },
    Custom { data: Vec<u8> },
}

fn name() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9]{0,5}"
}

fn planned() -> impl Strategy<Value = Planned> {
    prop_oneof![
        (name(), prop::collection::vec(any::<u8>().prop_filter("no EOF byte", |b| *b != 0x1A), 0..700))
            .prop_map(|(name, text)| Planned::Ascii { name, text }),
        (name(), prop::collection::vec(1u8..=255, 0..120)).prop_map(|(name, mut body)| {
            body.extend_from_slice(&[0u8; 7]);
            Planned::Program { name, body }
        }),
        (name(), 0u16..0x8000, any::<u16>(), prop::collection::vec(any::<u8>(), 1..400))
            .prop_map(|(name, start, exec, image)| Planned::Binary { name, start, exec, image }),
        prop::collection::vec(any::<u8>(), 1..200)
            .prop_filter("custom data must not look like a header", |d| {
                BlockKind::from_tag(d[0]).is_none()
                    && !d.windows(FRAME_MARKER.len()).any(|w| w == FRAME_MARKER)
            })
            .prop_map(|data| Planned::Custom { data }),
    ]
}

fn build(plan: &[Planned]) -> Vec<u8> {
    let mut w = TapeWriter::new(Vec::new());
    for p in plan {
        match p {
            Planned::Ascii { name, text } => w.write_ascii(name, text),
            Planned::Program { name, body } => w.write_program(name, body),
            Planned::Binary { name, start, exec, image } => w.write_binary(name, *start, *exec, image),
            Planned::Custom { data } => w.write_custom(data),
        }
        .unwrap();
    }
    w.finish().unwrap()
}

proptest! {
    #[test]
    fn prop_every_block_comes_back(plan in prop::collection::vec(planned(), 1..8)) {
        let tape = build(&plan);
        let mut out: Vec<TapeBlock> = Vec::new();
        let report = extract(Cursor::new(tape.clone()), &mut out, ExtractOptions { strict: true }).unwrap();

        prop_assert_eq!(out.len(), plan.len());
        prop_assert_eq!(report.bytes_scanned, tape.len() as u64);

        let mut custom_seq = 0;
        for (planned, block) in plan.iter().zip(&out) {
            match planned {
                Planned::Ascii { name, text } => {
                    prop_assert_eq!(&block.meta, &BlockMeta::Ascii { name: name.clone() });
                    prop_assert_eq!(&block.payload, text);
                }
                Planned::Program { name, body } => {
                    prop_assert_eq!(&block.meta, &BlockMeta::Program { name: name.clone() });
                    prop_assert_eq!(&block.payload, body);
                }
                Planned::Binary { name, start, exec, image } => {
                    let header = BinaryHeader {
                        start: *start,
                        end:   *start + (image.len() as u16 - 1),
                        exec:  *exec,
                    };
                    prop_assert_eq!(&block.meta, &BlockMeta::Binary { name: name.clone(), header });
                    let artifact = block.artifact_bytes();
                    prop_assert_eq!(&artifact[..6], &header.to_bytes()[..]);
                    prop_assert_eq!(&artifact[6..], &image[..]);
                }
                Planned::Custom { data } => {
                    custom_seq += 1;
                    prop_assert_eq!(&block.meta, &BlockMeta::Custom { seq: custom_seq });
                    prop_assert_eq!(&block.payload, data);
                }
            }
        }
    }

    #[test]
    fn prop_custom_payload_never_keeps_the_marker(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6)
    ) {
        // Raw custom blocks back to back, including empty ones.
        let mut tape = Vec::new();
        for chunk in &chunks {
            tape.extend_from_slice(&FRAME_MARKER);
            tape.push(0x00);
            tape.extend_from_slice(chunk);
        }
        let mut out: Vec<TapeBlock> = Vec::new();
        let _ = extract(Cursor::new(tape), &mut out, ExtractOptions::default());
        for block in &out {
            prop_assert!(!ends_with_marker(&block.payload));
        }
    }
}
