//! Synthetic trail-camera footage for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Rect, Scalar, Size, CV_8UC3},
    imgproc,
    prelude::*,
    videoio::{VideoWriter, VideoWriterTrait},
};

pub const WIDTH: i32 = 320;
pub const HEIGHT: i32 = 240;
pub const FPS: f64 = 10.0;

/// Write an MJPEG `.avi` of black frames, optionally with a bright square drifting right
pub fn write_video(path: &Path, frames: i32, with_subject: bool) {
    let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G').unwrap();
    let mut writer = VideoWriter::new(path.to_str().unwrap(), fourcc, FPS, Size::new(WIDTH, HEIGHT), true).unwrap();
    assert!(writer.is_opened().unwrap(), "MJPG writer unavailable");

    for i in 0..frames {
        let mut frame = Mat::new_rows_cols_with_default(HEIGHT, WIDTH, CV_8UC3, Scalar::all(0.0)).unwrap();
        if with_subject {
            let rect = Rect::new(60 + i, 60, 100, 100);
            imgproc::rectangle(&mut frame, rect, Scalar::all(255.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
        }
        writer.write(&frame).unwrap();
    }
    writer.release().unwrap();
}

/// A directory with `good` decodable videos and one garbage `.mp4`
pub fn footage_dir(good: usize) -> (tempfile::TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..good {
        let path = dir.path().join(format!("cam_{:02}.avi", i));
        write_video(&path, 30, i % 2 == 0);
        paths.push(path);
    }
    std::fs::write(dir.path().join("corrupt.mp4"), b"this is not a video").unwrap();
    (dir, paths)
}
