mod common;

use std::path::Path;

use opencv::prelude::*;

use trapcam_scan::{
    generate_thumbnail, video_info, AnalysisBatch, AnalyzerConfig, DetectorKind, FrameSampler, ThumbnailSpec,
    VideoAnalyzer, VideoStream,
};

fn accurate(workers: usize) -> VideoAnalyzer {
    let config = AnalyzerConfig {
        detector: DetectorKind::Accurate,
        workers,
        ..AnalyzerConfig::default()
    };
    VideoAnalyzer::new(&config).unwrap()
}

fn fast(workers: usize) -> VideoAnalyzer {
    let config = AnalyzerConfig {
        detector: DetectorKind::Fast,
        workers,
        ..AnalyzerConfig::default()
    };
    VideoAnalyzer::new(&config).unwrap()
}

#[test]
fn test_synthetic_video_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.avi");
    common::write_video(&path, 30, true);

    let info = video_info(path.to_str().unwrap()).unwrap();
    assert_eq!(info.width, common::WIDTH);
    assert_eq!(info.height, common::HEIGHT);
    assert!((info.fps - common::FPS).abs() < 0.01);
    assert_eq!(info.frame_count, 30);
    assert!((info.duration_seconds - 3.0).abs() < 0.01);
    assert!(info.is_valid());
}

#[test]
fn test_sampler_bounds_decoded_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.avi");
    common::write_video(&path, 30, true);

    let mut stream = VideoStream::open(path.to_str().unwrap()).unwrap();
    let samples = FrameSampler::new(4).unwrap().sample(&mut stream);

    let indices: Vec<i64> = samples.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 7, 14, 21]);
    assert!(samples.iter().all(|s| s.frame.cols() == common::WIDTH));
}

#[test]
fn test_directory_batch_skips_corrupt_file() {
    let (dir, good) = common::footage_dir(4);
    let output = dir.path().join("results.json");

    let batch = accurate(1).analyze_directory_to(dir.path(), &output).unwrap();

    assert_eq!(batch.len(), 4);
    let names: Vec<&str> = batch.results().iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["cam_00.avi", "cam_01.avi", "cam_02.avi", "cam_03.avi"]);
    assert_eq!(batch.results().len(), good.len());

    let reloaded = AnalysisBatch::load(&output).unwrap();
    assert_eq!(reloaded.len(), 4);
}

#[test]
fn test_detections_are_stamped_within_video() {
    let (dir, _) = common::footage_dir(2);
    let batch = accurate(1).analyze_directory(dir.path()).unwrap();

    let with_subject = batch.find_by_filename("cam_00.avi").unwrap();
    assert!(with_subject.detection_count > 0);
    assert_eq!(with_subject.detection_count, with_subject.detections.len());
    for detection in &with_subject.detections {
        assert!(detection.confidence > 0.5 && detection.confidence <= 1.0);
        assert!(detection.frame_time >= 0.0 && detection.frame_time < with_subject.duration_seconds);
        assert!(detection.bbox.x0 < detection.bbox.x1 && detection.bbox.y0 < detection.bbox.y1);
    }

    let empty = batch.find_by_filename("cam_01.avi").unwrap();
    assert_eq!(empty.detection_count, 0);
}

#[test]
fn test_reanalysis_is_idempotent() {
    let (dir, _) = common::footage_dir(3);

    let first = accurate(1).analyze_directory(dir.path()).unwrap();
    let second = accurate(3).analyze_directory(dir.path()).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.results().iter().zip(second.results()) {
        assert!(a.same_content(b), "{} changed between runs", a.filename);
    }
}

#[test]
fn test_fast_detector_batch_is_stable_and_in_frame() {
    let (dir, _) = common::footage_dir(3);

    let first = fast(1).analyze_directory(dir.path()).unwrap();
    let second = fast(2).analyze_directory(dir.path()).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first.len(), second.len());

    for (a, b) in first.results().iter().zip(second.results()) {
        assert!(a.same_content(b), "{} changed between runs", a.filename);
        assert_eq!(a.detection_count, a.detections.len());
        for detection in &a.detections {
            let bbox = &detection.bbox;
            assert!(bbox.x0 >= 0 && bbox.y0 >= 0);
            assert!(bbox.x1 <= common::WIDTH && bbox.y1 <= common::HEIGHT);
            assert!(bbox.x0 < bbox.x1 && bbox.y0 < bbox.y1);
            assert!(detection.confidence > 0.5 && detection.confidence <= 1.0);
            assert!(detection.frame_time >= 0.0 && detection.frame_time < a.duration_seconds);
        }
    }
}

#[test]
fn test_single_file_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.avi");
    common::write_video(&path, 12, true);

    let batch = accurate(1).analyze_path(&path).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.results()[0].filename, "single.avi");
}

#[test]
fn test_thumbnail_from_synthetic_video() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thumb.avi");
    common::write_video(&path, 20, true);

    let jpeg = generate_thumbnail(path.to_str().unwrap(), ThumbnailSpec::default()).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_thumbnail_of_empty_video_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.avi");
    common::write_video(&path, 0, false);

    let err = generate_thumbnail(path.to_str().unwrap(), ThumbnailSpec::default()).unwrap_err();
    assert!(err.is_not_found(), "expected not-found, got {:?}", err);
}

#[test]
fn test_missing_directory_fails() {
    assert!(accurate(1).analyze_directory(Path::new("definitely/not/here")).is_err());
}
