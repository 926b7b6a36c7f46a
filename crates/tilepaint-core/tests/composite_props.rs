//! Property checks for depth conversion, mixing and compositing.

use tilepaint_core::composite::ids;
use tilepaint_core::prelude::*;

fn registry() -> ColorSpaceRegistry {
    ColorSpaceRegistry::with_builtins()
}

#[test]
fn test_u8_u16_roundtrip_all_values() {
    let reg = registry();
    let rgba8 = reg.get("rgba-u8").unwrap();
    let rgba16 = reg.get("rgba-u16").unwrap();
    for v in 0..=255u8 {
        let src = [v, 255 - v, v / 2, v];
        let mut wide = [0u8; 8];
        let mut back = [0u8; 4];
        assert!(rgba8.convert_pixels_to(&rgba16, &src, &mut wide, 1, None).unwrap());
        assert!(rgba16.convert_pixels_to(&rgba8, &wide, &mut back, 1, None).unwrap());
        assert_eq!(back, src);
    }
}

#[test]
fn test_opaque_over_replaces_in_every_depth() {
    let reg = registry();
    for id in ["rgba-u8", "rgba-u16", "rgba-f16", "rgba-f32", "graya-u8", "cmyka-u16"] {
        let space = reg.get(id).unwrap();
        let ps = space.pixel_size();
        let n = space.traits().channel_count();
        let src_rgba = [30u8, 160, 90, 255];
        let mut src = vec![0u8; ps];
        space.from_rgba8(&src_rgba, &mut src, 1);
        for dst_rgba in [[0u8, 0, 0, 0], [255, 255, 255, 255], [50, 60, 70, 128]] {
            let mut dst = vec![0u8; ps];
            space.from_rgba8(&dst_rgba, &mut dst, 1);
            let over = space.composite_op(ids::OVER).unwrap();
            over.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
            let ty = space.channel_type();
            let cs = ty.bytes_per_channel();
            for c in 0..n {
                let a = tilepaint_core::pixel::read_normalized(ty, &src[c * cs..]);
                let b = tilepaint_core::pixel::read_normalized(ty, &dst[c * cs..]);
                let tol = if ty == ChannelType::F16 { 1e-3 } else { 1.0 / ty.unit_value() };
                assert!((a - b).abs() <= tol, "{id} channel {c}: {a} vs {b}");
            }
        }
    }
}

#[test]
fn test_erase_then_refill_restores_color() {
    let reg = registry();
    let rgba = reg.get("rgba-u8").unwrap();
    let erase = rgba.composite_op(ids::ERASE).unwrap();
    let copy = rgba.composite_op(ids::COPY).unwrap();

    let original = [123u8, 45, 67, 255];
    let mut dst = original;
    // Partial erases first, then a full one.
    for opacity in [0.3, 0.7, 1.0] {
        erase.composite(&[0, 0, 0, 255], &mut dst, 1, &CompositeParams::new(opacity));
        assert_eq!(&dst[..3], &original[..3]);
    }
    assert_eq!(dst[3], 0);

    let alpha_only = CompositeParams::new(1.0).with_flags(ChannelFlags::only(3));
    copy.composite(&[0, 0, 0, 255], &mut dst, 1, &alpha_only);
    assert_eq!(dst, original);
}

#[test]
fn test_mix_weight_conservation() {
    let reg = registry();
    for id in ["rgba-u8", "rgba-u16", "graya-f32", "cmyka-u8"] {
        let space = reg.get(id).unwrap();
        let mut px = vec![0u8; space.pixel_size()];
        space.from_rgba8(&[17, 99, 201, 180], &mut px, 1);
        for w0 in 0..=255i16 {
            let mut out = vec![0u8; space.pixel_size()];
            space.mix_colors(&[px.as_slice(), px.as_slice()], &[w0, 255 - w0], &mut out);
            if space.channel_type().is_float() {
                let ty = space.channel_type();
                let cs = ty.bytes_per_channel();
                for c in 0..space.traits().channel_count() {
                    let a = tilepaint_core::pixel::read_normalized(ty, &px[c * cs..]);
                    let b = tilepaint_core::pixel::read_normalized(ty, &out[c * cs..]);
                    assert!((a - b).abs() < 1e-5, "{id} split {w0}");
                }
            } else {
                assert_eq!(out, px, "{id} split {w0}");
            }
        }
    }
}

#[test]
fn test_repeated_over_does_not_drift() {
    let reg = registry();
    let rgba = reg.get("rgba-u8").unwrap();
    let over = rgba.composite_op(ids::OVER).unwrap();
    let src = [200u8, 100, 50, 255];
    let mut dst = [200u8, 100, 50, 255];
    for _ in 0..1000 {
        over.composite(&src, &mut dst, 1, &CompositeParams::new(0.37));
    }
    assert_eq!(dst, src);
}

#[test]
fn test_every_builtin_op_handles_transparent_source() {
    let reg = registry();
    let rgba = reg.get("rgba-u16").unwrap();
    let src = vec![0u8; 8];
    for id in rgba.composite_op_ids().map(str::to_string).collect::<Vec<_>>() {
        if id == ids::COPY || id == ids::DESTINATION_IN {
            continue;
        }
        let op = rgba.composite_op(&id).unwrap();
        let mut dst = vec![0u8; 8];
        for (c, v) in [1000u16, 2000, 3000, 40000].into_iter().enumerate() {
            dst[c * 2..c * 2 + 2].copy_from_slice(&v.to_ne_bytes());
        }
        let before = dst.clone();
        op.composite(&src, &mut dst, 1, &CompositeParams::new(1.0));
        assert_eq!(dst, before, "op {id}");
    }
}
