//! Tests for page-level transparency and spot-colorant detection.

use inkplane_core::interp::check::{CheckOptions, check_page};
use inkplane_core::model::objects::{Dict, ObjRef, Object, dict_from};
use inkplane_core::model::store::ObjectStore;

fn name(s: &str) -> Object {
    Object::Name(s.to_string())
}

fn spot_opts() -> CheckOptions {
    CheckOptions {
        track_spots: true,
        ..Default::default()
    }
}

fn page_with_resources(resources: Dict) -> Dict {
    dict_from([
        ("Type", name("Page")),
        ("Resources", Object::Dict(resources)),
    ])
}

fn separation(colorant: &str) -> Object {
    Object::Array(vec![
        name("Separation"),
        name(colorant),
        name("DeviceCMYK"),
        Object::Null,
    ])
}

#[test]
fn page_level_group_is_not_a_transparency_trigger() {
    let store = ObjectStore::new();
    let mut page = page_with_resources(Dict::new());
    page.insert(
        "Group".to_string(),
        Object::Dict(dict_from([
            ("S", name("Transparency")),
            ("CS", name("DeviceRGB")),
        ])),
    );

    let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(!result.transparent);

    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(!result.transparent);
}

#[test]
fn form_group_is_transparent_regardless_of_contents() {
    let store = ObjectStore::new();
    let form = dict_from([
        ("Subtype", name("Form")),
        ("Group", Object::Dict(Dict::new())),
    ]);
    let page = page_with_resources(dict_from([(
        "XObject",
        Object::Dict(dict_from([("F0", Object::Dict(form))])),
    )]));

    let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(result.transparent);
}

#[test]
fn extgstate_alpha_triggers_transparency() {
    let store = ObjectStore::new();
    let page = page_with_resources(dict_from([(
        "ExtGState",
        Object::Dict(dict_from([(
            "GS0",
            Object::Dict(dict_from([("ca", Object::Real(0.5))])),
        )])),
    )]));
    let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(result.transparent);
}

#[test]
fn opaque_extgstate_is_not_transparent() {
    let store = ObjectStore::new();
    let gs = dict_from([
        ("CA", Object::Real(1.0)),
        ("ca", Object::Real(1.0)),
        ("BM", name("Normal")),
        ("SMask", name("None")),
    ]);
    let page = page_with_resources(dict_from([(
        "ExtGState",
        Object::Dict(dict_from([("GS0", Object::Dict(gs))])),
    )]));
    let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(!result.transparent);
}

#[test]
fn compatible_blend_mode_is_opaque_others_are_not() {
    let store = ObjectStore::new();
    for (bm, expected) in [("Compatible", false), ("Normal", false), ("Multiply", true)] {
        let page = page_with_resources(dict_from([(
            "ExtGState",
            Object::Dict(dict_from([(
                "GS0",
                Object::Dict(dict_from([("BM", name(bm))])),
            )])),
        )]));
        let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
        assert_eq!(result.transparent, expected, "blend mode {bm}");
    }
}

#[test]
fn image_smask_and_smask_in_data_trigger() {
    let store = ObjectStore::new();
    let image = dict_from([
        ("Subtype", name("Image")),
        ("SMask", Object::Dict(Dict::new())),
    ]);
    let page = page_with_resources(dict_from([(
        "XObject",
        Object::Dict(dict_from([("I0", Object::Dict(image))])),
    )]));
    assert!(
        check_page(&store, &page, &CheckOptions::default())
            .unwrap()
            .transparent
    );

    let image = dict_from([
        ("Subtype", name("Image")),
        ("SMaskInData", Object::Int(1)),
    ]);
    let page = page_with_resources(dict_from([(
        "XObject",
        Object::Dict(dict_from([("I0", Object::Dict(image))])),
    )]));
    assert!(
        check_page(&store, &page, &CheckOptions::default())
            .unwrap()
            .transparent
    );

    // SMaskInData of zero means the JPX data carries no alpha.
    let image = dict_from([
        ("Subtype", name("Image")),
        ("SMaskInData", Object::Int(0)),
    ]);
    let page = page_with_resources(dict_from([(
        "XObject",
        Object::Dict(dict_from([("I0", Object::Dict(image))])),
    )]));
    assert!(
        !check_page(&store, &page, &CheckOptions::default())
            .unwrap()
            .transparent
    );
}

#[test]
fn spot_discovery_is_idempotent_and_order_independent() {
    let store = ObjectStore::new();
    let devicen = Object::Array(vec![
        name("DeviceN"),
        Object::Array(vec![name("Gold"), name("Silver")]),
        name("DeviceCMYK"),
        Object::Null,
    ]);

    let forward = page_with_resources(dict_from([(
        "ColorSpace",
        Object::Dict(dict_from([
            ("CS0", separation("PANTONE 485")),
            ("CS1", devicen.clone()),
        ])),
    )]));
    let reversed = page_with_resources(dict_from([(
        "ColorSpace",
        Object::Dict(dict_from([
            ("CS1", devicen.clone()),
            ("CS0", separation("PANTONE 485")),
        ])),
    )]));

    let a = check_page(&store, &forward, &spot_opts()).unwrap();
    let b = check_page(&store, &forward, &spot_opts()).unwrap();
    let c = check_page(&store, &reversed, &spot_opts()).unwrap();

    assert_eq!(a.num_spots(), 3);
    let as_set = |r: &inkplane_core::interp::check::PageCheck| {
        let mut v: Vec<String> = r.spot_names.iter().cloned().collect();
        v.sort();
        v
    };
    assert_eq!(as_set(&a), as_set(&b));
    assert_eq!(as_set(&a), as_set(&c));
}

#[test]
fn process_colorants_are_not_spots() {
    let store = ObjectStore::new();
    let page = page_with_resources(dict_from([(
        "ColorSpace",
        Object::Dict(dict_from([
            ("CS0", separation("Cyan")),
            ("CS1", separation("All")),
            ("CS2", separation("None")),
            ("CS3", separation("Bronze")),
        ])),
    )]));
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert_eq!(result.num_spots(), 1);
    assert!(result.spot_names.contains("Bronze"));
}

#[test]
fn spots_found_through_indexed_and_iccbased() {
    let mut store = ObjectStore::new();
    store.insert(
        9,
        Object::Dict(dict_from([
            ("N", Object::Int(1)),
            ("Alternate", separation("Varnish")),
        ])),
    );

    let indexed = Object::Array(vec![
        name("Indexed"),
        separation("Gold"),
        Object::Int(3),
        Object::String(vec![0; 4]),
    ]);
    let icc = Object::Array(vec![name("ICCBased"), Object::Ref(ObjRef::new(9, 0))]);

    let page = page_with_resources(dict_from([(
        "ColorSpace",
        Object::Dict(dict_from([("CS0", indexed), ("CS1", icc)])),
    )]));
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert_eq!(result.num_spots(), 2);
    assert!(result.spot_names.contains("Gold"));
    assert!(result.spot_names.contains("Varnish"));
}

#[test]
fn shading_colorspace_contributes_spots() {
    let store = ObjectStore::new();
    let shading = dict_from([
        ("ShadingType", Object::Int(2)),
        ("ColorSpace", separation("Pearl")),
    ]);
    let page = page_with_resources(dict_from([(
        "Shading",
        Object::Dict(dict_from([("Sh0", Object::Dict(shading))])),
    )]));
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(result.spot_names.contains("Pearl"));
}

#[test]
fn cyclic_pattern_graph_terminates() {
    let mut store = ObjectStore::new();
    // Pattern 10 has Resources whose Pattern dictionary points back at 10.
    let inner_patterns = dict_from([("P0", Object::Ref(ObjRef::new(10, 0)))]);
    let pattern = dict_from([
        ("PatternType", Object::Int(1)),
        (
            "Shading",
            Object::Dict(dict_from([("ColorSpace", separation("Neon"))])),
        ),
        (
            "Resources",
            Object::Dict(dict_from([("Pattern", Object::Dict(inner_patterns))])),
        ),
    ]);
    store.insert(10, Object::Dict(pattern));

    let page = page_with_resources(dict_from([(
        "Pattern",
        Object::Dict(dict_from([("P0", Object::Ref(ObjRef::new(10, 0)))])),
    )]));

    // Must terminate, returning what was discovered before the cycle closed.
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(result.spot_names.contains("Neon"));
}

#[test]
fn highlight_annotation_is_transparent_only_when_rendered() {
    let store = ObjectStore::new();
    let mut page = page_with_resources(Dict::new());
    page.insert(
        "Annots".to_string(),
        Object::Array(vec![Object::Dict(dict_from([(
            "Subtype",
            name("Highlight"),
        )]))]),
    );

    let rendered = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(rendered.transparent);

    let skipped = check_page(
        &store,
        &page,
        &CheckOptions {
            render_annotations: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(!skipped.transparent);
}

#[test]
fn annotation_appearance_resources_contribute_spots() {
    let store = ObjectStore::new();
    let ap_resources = dict_from([(
        "ColorSpace",
        Object::Dict(dict_from([("CS0", separation("Foil"))])),
    )]);
    let annot = dict_from([
        ("Subtype", name("Square")),
        (
            "AP",
            Object::Dict(dict_from([(
                "N",
                Object::Dict(dict_from([("Resources", Object::Dict(ap_resources))])),
            )])),
        ),
    ]);
    let mut page = page_with_resources(Dict::new());
    page.insert("Annots".to_string(), Object::Array(vec![Object::Dict(annot)]));

    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(result.spot_names.contains("Foil"));
    assert!(!result.transparent);
}

#[test]
fn transparency_does_not_skip_spot_discovery() {
    let store = ObjectStore::new();
    // ExtGState triggers transparency, but the ColorSpace resources of the
    // same dictionary still have to be scanned for spot names.
    let page = page_with_resources(dict_from([
        (
            "ColorSpace",
            Object::Dict(dict_from([("CS0", separation("Copper"))])),
        ),
        (
            "ExtGState",
            Object::Dict(dict_from([(
                "GS0",
                Object::Dict(dict_from([("ca", Object::Real(0.25))])),
            )])),
        ),
    ]));
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(result.transparent);
    assert!(result.spot_names.contains("Copper"));
}

#[test]
fn form_group_colorspace_contributes_spots() {
    let store = ObjectStore::new();
    let form = dict_from([
        ("Subtype", name("Form")),
        (
            "Group",
            Object::Dict(dict_from([
                ("S", name("Transparency")),
                ("CS", separation("Lacquer")),
            ])),
        ),
    ]);
    let page = page_with_resources(dict_from([(
        "XObject",
        Object::Dict(dict_from([("F0", Object::Dict(form))])),
    )]));
    let result = check_page(&store, &page, &spot_opts()).unwrap();
    assert!(result.transparent);
    assert!(result.spot_names.contains("Lacquer"));
}

#[test]
fn type3_font_resources_are_walked() {
    let store = ObjectStore::new();
    let font = dict_from([
        ("Subtype", name("Type3")),
        (
            "Resources",
            Object::Dict(dict_from([(
                "ExtGState",
                Object::Dict(dict_from([(
                    "GS0",
                    Object::Dict(dict_from([("CA", Object::Real(0.3))])),
                )])),
            )])),
        ),
    ]);
    let page = page_with_resources(dict_from([(
        "Font",
        Object::Dict(dict_from([("T3", Object::Dict(font))])),
    )]));
    let result = check_page(&store, &page, &CheckOptions::default()).unwrap();
    assert!(result.transparent);
}
