//! End-to-end runs through the engine: config, scheduler, painter, LOD and display.

use std::sync::{Arc, Mutex};
use tilepaint_core::Rect;
use tilepaint_ops::{
    convert_to_rgba8, create_thumbnail_device, lod_sync_job, Engine, EngineConfig, Job, JobKind,
    OpsError, SharedDevice,
};

const RED: [u8; 4] = [200, 30, 30, 255];

fn dab(layer: &SharedDevice, stroke: tilepaint_ops::StrokeId, rect: Rect) -> Job {
    let dev = layer.clone();
    Job::new(stroke, JobKind::DoStroke, "dab", move |ctx| {
        let mut guard = dev.write();
        ctx.painter(&mut guard).fill_rect_with_mask(rect, &RED, None)?;
        Ok(())
    })
    .writes(layer.id(), rect)
}

#[test]
fn test_stroke_with_lod_barrier() {
    let engine = Engine::new(EngineConfig {
        worker_threads: 2,
        lod_levels: 2,
        ..Default::default()
    })
    .unwrap();
    let layer = SharedDevice::new(engine.create_device(None).unwrap());
    let lod = Arc::new(Mutex::new(engine.lod_cache(&layer.read())));
    let mut sched = engine.scheduler().unwrap();

    let stroke = sched.begin_stroke();
    sched.submit(Job::new(stroke, JobKind::Init, "init", |_| Ok(()))).unwrap();
    for i in 0..4 {
        sched.submit(dab(&layer, stroke, Rect::new(i * 64, 0, 64, 64))).unwrap();
    }
    sched
        .submit(lod_sync_job(stroke, Arc::clone(&lod), layer.clone(), Rect::new(0, 0, 256, 64)))
        .unwrap();
    sched.submit(Job::new(stroke, JobKind::Finish, "finish", |_| Ok(()))).unwrap();

    let report = sched.run();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.completed, 7);
    assert_eq!(report.waves, 4);

    let lod = lod.lock().unwrap();
    assert_eq!(lod.level(1).unwrap().pixel(127, 31), &RED);
    assert_eq!(lod.level(2).unwrap().exact_bounds(), Rect::new(0, 0, 64, 16));

    let img = convert_to_rgba8(&layer.read(), Rect::new(254, 0, 4, 1), None).unwrap();
    assert_eq!(img.pixel(1, 0), RED);
    assert_eq!(img.pixel(2, 0), [0, 0, 0, 0]);
}

#[test]
fn test_budget_failure_aborts_stroke() {
    let engine = Engine::new(EngineConfig {
        tile_budget: Some(1),
        worker_threads: 1,
        ..Default::default()
    })
    .unwrap();
    let layer = SharedDevice::new(engine.create_device(None).unwrap());
    let mut sched = engine.scheduler().unwrap();
    let stroke = sched.begin_stroke();
    sched.submit(dab(&layer, stroke, Rect::new(0, 0, 100, 10))).unwrap();
    sched
        .submit(dab(&layer, stroke, Rect::new(0, 0, 10, 10)).ordering(tilepaint_ops::JobOrdering::Sequential))
        .unwrap();

    let report = sched.run();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.is_allocation_error());
    assert_eq!(report.skipped, 1);
    match report.into_result() {
        Err(OpsError::StrokeAborted { stroke: s, .. }) => assert_eq!(s, stroke.get()),
        other => panic!("expected abort, got {other:?}"),
    }
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.yaml");
    std::fs::write(
        &path,
        "default_color_space: graya-u8\nthumbnail_oversample: 1\ntile_budget: 8\n",
    )
    .unwrap();

    let config = EngineConfig::from_file(&path).unwrap();
    let engine = Engine::new(config).unwrap();
    let mut dev = engine.create_device(None).unwrap();
    assert_eq!(dev.color_space().id(), "graya-u8");
    dev.set_pixel(2, 2, &[90, 255]).unwrap();

    let thumb = create_thumbnail_device(
        &dev,
        1,
        1,
        Rect::new(0, 0, 4, 4),
        engine.config().thumbnail_oversample,
        None,
    )
    .unwrap()
    .into_inner();
    assert_eq!(thumb.pixel(0, 0), &[90, 255]);
    assert_eq!(engine.budget().used(), 2);

    assert!(matches!(
        EngineConfig::from_file(dir.path().join("missing.yaml")),
        Err(OpsError::Io(_))
    ));
}
