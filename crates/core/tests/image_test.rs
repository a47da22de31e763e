//! Tests for the image decode/render engine.

use inkplane_core::codec::ExternalFilter;
use inkplane_core::error::{RenderError, Result};
use inkplane_core::interp::device::{ImageParams, ImageSink, ImageVariant};
use inkplane_core::interp::image::{ImageSource, RenderContext, do_image};
use inkplane_core::interp::ops::{DoAction, exec_do, exec_inline_image};
use inkplane_core::model::color::ColorSpace;
use inkplane_core::model::objects::{Dict, ObjRef, Object, Stream, dict_from};
use inkplane_core::model::state::GraphicState;
use inkplane_core::model::store::ObjectStore;

fn name(s: &str) -> Object {
    Object::Name(s.to_string())
}

/// Sink that records everything it is fed.
#[derive(Default)]
struct CollectSink {
    params: Option<ImageParams>,
    rows: Vec<Vec<u8>>,
    mask_planes: Vec<Option<Vec<u8>>>,
    ended: bool,
}

impl ImageSink for CollectSink {
    fn begin_image(&mut self, _gstate: &GraphicState, params: &ImageParams) -> Result<()> {
        self.params = Some(params.clone());
        Ok(())
    }

    fn image_row(&mut self, row: &[u8], mask_plane: Option<&[u8]>) -> Result<()> {
        self.rows.push(row.to_vec());
        self.mask_planes.push(mask_plane.map(<[u8]>::to_vec));
        Ok(())
    }

    fn end_image(&mut self) -> Result<()> {
        self.ended = true;
        Ok(())
    }
}

fn gray_image(width: i64, height: i64, data: &[u8]) -> Stream {
    Stream::new(
        dict_from([
            ("Subtype", name("Image")),
            ("Width", Object::Int(width)),
            ("Height", Object::Int(height)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
        ]),
        data.to_vec(),
    )
}

#[test]
fn plain_image_streams_one_scanline_per_row() {
    let store = ObjectStore::new();
    let data: Vec<u8> = (0..12).collect();
    let image = gray_image(4, 3, &data);
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    let consumed = do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    assert_eq!(consumed, 0);
    assert!(sink.ended);
    assert_eq!(sink.rows.len(), 3);
    assert_eq!(sink.rows[0], vec![0, 1, 2, 3]);
    assert_eq!(sink.rows[2], vec![8, 9, 10, 11]);

    let params = sink.params.unwrap();
    assert_eq!(params.ncomps, 1);
    assert_eq!(params.decode, vec![0.0, 1.0]);
    assert_eq!(params.colorspace, Some(ColorSpace::DeviceGray));
    assert_eq!(params.variant, ImageVariant::Plain);
}

#[test]
fn short_image_data_is_a_hard_failure() {
    let store = ObjectStore::new();
    let image = gray_image(4, 3, &[0u8; 10]);
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    let err = do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap_err();
    assert!(matches!(err, RenderError::LimitCheck(_)));
}

#[test]
fn missing_width_is_an_error() {
    let store = ObjectStore::new();
    let image = Stream::new(dict_from([("Height", Object::Int(3))]), vec![]);
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);
    assert!(do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).is_err());
}

#[test]
fn image_mask_defaults_to_one_bit() {
    let store = ObjectStore::new();
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(8)),
            ("Height", Object::Int(2)),
            ("ImageMask", Object::Bool(true)),
        ]),
        vec![0xF0, 0x0F],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    let params = sink.params.unwrap();
    assert!(params.image_mask);
    assert_eq!(params.bpc, 1);
    assert_eq!(params.ncomps, 1);
    assert!(params.colorspace.is_none());
    assert_eq!(sink.rows.len(), 2);
    assert_eq!(sink.rows[0], vec![0xF0]);
}

#[test]
fn stencil_mask_plane_accompanies_every_row() {
    let store = ObjectStore::new();
    let mask = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(2)),
            ("BitsPerComponent", Object::Int(1)),
            ("ImageMask", Object::Bool(true)),
        ]),
        vec![0x80, 0x40],
    );
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(2)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
            ("Mask", Object::Stream(Box::new(mask))),
        ]),
        vec![10, 20, 30, 40],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    let params = sink.params.unwrap();
    match params.variant {
        ImageVariant::Stencil { mask } => {
            assert_eq!(mask.width, 2);
            assert_eq!(mask.height, 2);
            assert_eq!(mask.bpc, 1);
        }
        other => panic!("unexpected variant {other:?}"),
    }
    assert_eq!(sink.rows.len(), 2);
    for plane in &sink.mask_planes {
        assert_eq!(plane.as_deref(), Some(&[0x80u8, 0x40][..]));
    }
}

#[test]
fn color_key_mask_becomes_a_range_variant() {
    let store = ObjectStore::new();
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(1)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
            ("Mask", Object::Array(vec![Object::Int(250), Object::Int(255)])),
        ]),
        vec![1, 2],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    assert_eq!(
        sink.params.unwrap().variant,
        ImageVariant::ColorKey {
            ranges: vec![250, 255]
        }
    );
}

#[test]
fn smask_disables_the_mask_entirely() {
    let store = ObjectStore::new();
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(1)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
            ("SMask", Object::Dict(Dict::new())),
            ("Mask", Object::Array(vec![Object::Int(0), Object::Int(0)])),
        ]),
        vec![1, 2],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    // Neither the soft mask nor the color-key mask survives.
    assert_eq!(sink.params.unwrap().variant, ImageVariant::Plain);
}

#[test]
fn indexed_colorspace_defaults_decode_to_hival() {
    let store = ObjectStore::new();
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(4)),
            ("Height", Object::Int(1)),
            ("BitsPerComponent", Object::Int(4)),
            (
                "ColorSpace",
                Object::Array(vec![
                    name("Indexed"),
                    name("DeviceRGB"),
                    Object::Int(7),
                    Object::String(vec![0; 24]),
                ]),
            ),
        ]),
        vec![0x01, 0x23],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    assert_eq!(sink.params.unwrap().decode, vec![0.0, 7.0]);
}

#[test]
fn missing_colorspace_flushes_exactly_the_sample_bits() {
    let store = ObjectStore::new();
    // 4x2 at 8 bpc with the device's 4 native components: 32 bytes.
    let dict = dict_from([
        ("W", Object::Int(4)),
        ("H", Object::Int(2)),
        ("BPC", Object::Int(8)),
    ]);
    let data = vec![0u8; 64];
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    let consumed = do_image(
        &mut ctx,
        &Dict::new(),
        ImageSource::Inline {
            dict: &dict,
            data: &data,
        },
    )
    .unwrap();
    assert_eq!(consumed, 32);
    // Nothing is painted on the pass-through path.
    assert!(sink.params.is_none());
    assert!(sink.rows.is_empty());
}

#[test]
fn unfiltered_inline_image_consumes_exact_byte_count() {
    let store = ObjectStore::new();
    let dict = dict_from([
        ("W", Object::Int(2)),
        ("H", Object::Int(2)),
        ("BPC", Object::Int(8)),
        ("CS", name("G")),
    ]);
    let data = vec![9u8, 8, 7, 6, 0xAA, 0xBB, 0xCC];
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    let consumed = exec_inline_image(&mut ctx, &dict, &data, &Dict::new()).unwrap();
    assert_eq!(consumed, 4);
    assert_eq!(sink.rows, vec![vec![9, 8], vec![7, 6]]);
}

#[test]
fn printing_alternate_replaces_the_image() {
    let mut store = ObjectStore::new();
    let alt = gray_image(2, 1, &[5, 6]);
    store.insert(21, Object::Stream(Box::new(alt)));

    let alternates = Object::Array(vec![Object::Dict(dict_from([
        ("DefaultForPrinting", Object::Bool(true)),
        ("Image", Object::Ref(ObjRef::new(21, 0))),
    ]))]);
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(8)),
            ("Height", Object::Int(8)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
            ("Alternates", alternates),
        ]),
        vec![0; 64],
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    let params = sink.params.unwrap();
    assert_eq!((params.width, params.height), (2, 1));
    assert_eq!(sink.rows, vec![vec![5, 6]]);
}

/// Fake decoder standing in for the JPX/DCT libraries.
struct FixedDecoder(Vec<u8>);

impl ExternalFilter for FixedDecoder {
    fn decode(&self, _filter: &str, _parms: Option<&Dict>, _data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn jp2_header(comps: u16, depth_minus_one: u8, cs_enum: u32) -> Vec<u8> {
    fn push_box(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
        out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(payload);
    }
    let mut ihdr = vec![0u8; 14];
    ihdr[8..10].copy_from_slice(&comps.to_be_bytes());
    ihdr[10] = depth_minus_one;
    let mut colr = vec![1u8, 0, 0];
    colr.extend_from_slice(&cs_enum.to_be_bytes());

    let mut inner = Vec::new();
    push_box(&mut inner, b"ihdr", &ihdr);
    push_box(&mut inner, b"colr", &colr);
    let mut out = Vec::new();
    push_box(&mut out, b"jp2h", &inner);
    out
}

#[test]
fn jpx_image_infers_colorspace_from_header() {
    let store = ObjectStore::new();
    // sRGB (enumerated 16), 3 components, 8 bits.
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(2)),
            ("Filter", name("JPXDecode")),
        ]),
        jp2_header(3, 7, 16),
    );
    let decoder = FixedDecoder((0u8..12).collect());
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);
    ctx.external = Some(&decoder);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    let params = sink.params.unwrap();
    assert_eq!(params.colorspace, Some(ColorSpace::DeviceRGB));
    assert_eq!(params.ncomps, 3);
    assert_eq!(params.bpc, 8);
    assert_eq!(sink.rows.len(), 2);
}

#[test]
fn exec_do_always_pops_its_operand() {
    let store = ObjectStore::new();
    let page = Dict::new();
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    // Unknown XObject: swallowed, operand gone.
    let mut stack = vec![name("Im1")];
    let action = exec_do(&mut ctx, &mut stack, None, &page).unwrap();
    assert!(matches!(action, DoAction::Done));
    assert!(stack.is_empty());

    // Same failure with stop-on-error set escalates, operand still gone.
    ctx.stop_on_error = true;
    let mut stack = vec![name("Im1")];
    assert!(exec_do(&mut ctx, &mut stack, None, &page).is_err());
    assert!(stack.is_empty());
}

#[test]
fn exec_do_renders_images_and_defers_forms() {
    let store = ObjectStore::new();
    let image = gray_image(2, 1, &[3, 4]);
    let form = dict_from([("Subtype", name("Form")), ("BBox", Object::Null)]);
    let page = dict_from([(
        "Resources",
        Object::Dict(dict_from([(
            "XObject",
            Object::Dict(dict_from([
                ("Im0", Object::Stream(Box::new(image))),
                ("Fm0", Object::Dict(form)),
            ])),
        )])),
    )]);

    let mut sink = CollectSink::default();

    let mut stack = vec![name("Im0")];
    {
        let mut ctx = RenderContext::new(&store, &mut sink);
        let action = exec_do(&mut ctx, &mut stack, None, &page).unwrap();
        assert!(matches!(action, DoAction::Done));
    }
    assert_eq!(sink.rows, vec![vec![3, 4]]);

    let mut stack = vec![name("Fm0")];
    let mut ctx = RenderContext::new(&store, &mut sink);
    let action = exec_do(&mut ctx, &mut stack, None, &page).unwrap();
    match action {
        DoAction::Form(obj) => assert!(obj.as_dict().is_ok()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn flate_compressed_image_decodes_through_the_chain() {
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&[11u8, 22, 33, 44]).unwrap();
    let compressed = enc.finish().unwrap();

    let store = ObjectStore::new();
    let image = Stream::new(
        dict_from([
            ("Width", Object::Int(2)),
            ("Height", Object::Int(2)),
            ("BitsPerComponent", Object::Int(8)),
            ("ColorSpace", name("DeviceGray")),
            ("Filter", name("FlateDecode")),
        ]),
        compressed,
    );
    let mut sink = CollectSink::default();
    let mut ctx = RenderContext::new(&store, &mut sink);

    do_image(&mut ctx, &Dict::new(), ImageSource::XObject(&image)).unwrap();
    assert_eq!(sink.rows, vec![vec![11, 22], vec![33, 44]]);
}
