// tests/integration_tests.rs
//
// End-to-end tests of the public API: upload -> process -> report, going
// through real directories the way a web layer would.

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imagelab::{
    Channel, Dispatcher, ErrorBody, ErrorKind, LabConfig, Outputs, ProcessResult, Session,
};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::{tempdir, TempDir};

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

struct Lab {
    _root: TempDir,
    dispatcher: Dispatcher,
    session: Session,
}

impl Lab {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let mut config = LabConfig::with_dirs(root.path().join("uploads"), root.path().join("outputs"));
        config.transform.optimize_png = false;
        Self {
            dispatcher: Dispatcher::new(config).unwrap(),
            session: Session::new(),
            _root: root,
        }
    }

    fn upload(&self, name: &str, bytes: &[u8]) -> String {
        self.dispatcher
            .upload(&self.session, name, bytes)
            .unwrap()
            .filename
    }

    fn process(&self, name: &str, op: &str, params: Value) -> imagelab::Result<ProcessResult> {
        self.dispatcher.process(&self.session, name, op, &params)
    }

    fn outputs_dir_len(&self) -> usize {
        std::fs::read_dir(&self.dispatcher.config().output_dir)
            .unwrap()
            .count()
    }
}

#[test]
fn test_reduce_200x150_by_half() {
    let lab = Lab::new();
    let name = lab.upload("photo.png", &encode(create_test_image(200, 150), ImageFormat::Png));
    let result = lab.process(&name, "reduce", json!({"scale": 0.5})).unwrap();

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["outputs"]["dimensions"], json!([100, 75]));
    let image = value["outputs"]["image"].as_str().unwrap();
    assert_eq!(image, "photo_png_reduced_0p5.png");

    let stored = std::fs::read(lab.dispatcher.artifact_path(image).unwrap()).unwrap();
    let decoded = image::load_from_memory(&stored).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 75));
}

#[test]
fn test_reduce_scale_zero_is_invalid() {
    let lab = Lab::new();
    let name = lab.upload("photo.png", &encode(create_test_image(20, 20), ImageFormat::Png));
    let err = lab.process(&name, "reduce", json!({"scale": 0})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(lab.outputs_dir_len(), 0);
}

#[test]
fn test_unknown_operation() {
    let lab = Lab::new();
    let name = lab.upload("photo.png", &encode(create_test_image(20, 20), ImageFormat::Png));
    let err = lab.process(&name, "rotate", Value::Null).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();
    assert!(body["error"].as_str().unwrap().contains("rotate"));
}

#[test]
fn test_uniform_gray_analysis() {
    let lab = Lab::new();
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([128, 128, 128])));
    let name = lab.upload("flat.bmp", &encode(img, ImageFormat::Bmp));
    let result = lab.process(&name, "analyse", Value::Null).unwrap();

    let Outputs::Analysis {
        structure,
        hist_stats,
        hist_images,
    } = result.outputs
    else {
        panic!("analyse returned {:?}", result.outputs);
    };
    assert_eq!(structure.dimensions, (100, 100));
    assert_eq!(structure.channels, 3);
    for channel in Channel::ALL {
        let s = hist_stats[&channel];
        assert_eq!((s.min, s.max, s.median), (128, 128, 128));
        assert_eq!(s.mean, 128.0);
        assert_eq!(s.std, 0.0);
        let chart = lab.dispatcher.artifact_path(&hist_images[&channel]).unwrap();
        let chart = image::open(chart).unwrap();
        assert_eq!((chart.width(), chart.height()), (400, 220));
    }
}

#[test]
fn test_webp_reports_sizes_and_keeps_dimensions() {
    let lab = Lab::new();
    let png = encode(create_test_image(64, 48), ImageFormat::Png);
    let name = lab.upload("photo.png", &png);
    let value = serde_json::to_value(lab.process(&name, "webp", Value::Null).unwrap()).unwrap();
    let outputs = value["outputs"].as_object().unwrap();
    let mut keys: Vec<&str> = outputs.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["image", "size_after", "size_before"]);
    assert_eq!(outputs["size_before"], json!(png.len()));

    let stored = std::fs::read(
        lab.dispatcher
            .artifact_path(outputs["image"].as_str().unwrap())
            .unwrap(),
    )
    .unwrap();
    assert_eq!(outputs["size_after"], json!(stored.len()));
    let features = webp::BitstreamFeatures::new(&stored).unwrap();
    assert_eq!((features.width(), features.height()), (64, 48));
}

#[test]
fn test_mirror_and_gray_artifacts() {
    let lab = Lab::new();
    let name = lab.upload("photo.jpg", &encode(create_test_image(32, 16), ImageFormat::Jpeg));

    let mirror = serde_json::to_value(lab.process(&name, "mirror", Value::Null).unwrap()).unwrap();
    assert_eq!(mirror, json!({"outputs": {"image": "photo_jpg_mirrored.png"}}));

    let gray = serde_json::to_value(lab.process(&name, "gray", Value::Null).unwrap()).unwrap();
    assert_eq!(gray, json!({"outputs": {"image": "photo_jpg_gray.png"}}));
    let path = lab.dispatcher.artifact_path("photo_jpg_gray.png").unwrap();
    assert!(matches!(image::open(path).unwrap(), DynamicImage::ImageLuma8(_)));
}

#[test]
fn test_report_before_and_after_analysis() {
    let lab = Lab::new();
    let png = encode(create_test_image(40, 30), ImageFormat::Png);
    let name = lab.upload("scan.png", &png);

    let report = lab.dispatcher.report(&lab.session, &name).unwrap();
    assert_eq!(report.name, "scan_png_report.txt");
    assert!(report.text.contains("scan.png"));
    assert!(report.text.contains("40 x 30"));
    assert!(report.text.contains(&format!("{} bytes", png.len())));
    assert!(!report.text.contains("median="));

    lab.process(&name, "analyse", Value::Null).unwrap();
    let report = lab.dispatcher.report(&lab.session, &name).unwrap();
    assert!(report.text.contains("median="));
    let saved = std::fs::read_to_string(lab.dispatcher.artifact_path(&report.name).unwrap())
        .unwrap();
    assert_eq!(saved, report.text);
}

#[test]
fn test_grayscale_upload_statistics_are_identical_across_channels() {
    let lab = Lab::new();
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(50, 20, |x, y| Luma([(x * 5 + y) as u8])));
    let name = lab.upload("g.png", &encode(img, ImageFormat::Png));
    let value = serde_json::to_value(lab.process(&name, "analyse", Value::Null).unwrap()).unwrap();
    let stats = &value["outputs"]["hist_stats"];
    assert_eq!(stats["R"], stats["G"]);
    assert_eq!(stats["G"], stats["B"]);
    assert_eq!(value["outputs"]["structure"]["mode"], json!("GRAYSCALE"));
}

#[test]
fn test_rgba_upload_keeps_alpha_through_reduce() {
    let lab = Lab::new();
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([200, 10, 10, 128])));
    let name = lab.upload("t.png", &encode(img, ImageFormat::Png));
    lab.process(&name, "reduce", json!({"scale": "0.5"})).unwrap();
    let path = lab.dispatcher.artifact_path("t_png_reduced_0p5.png").unwrap();
    let reduced = image::open(path).unwrap();
    assert!(reduced.color().has_alpha());
}

#[test]
fn test_sessions_are_isolated() {
    let lab = Lab::new();
    let name = lab.upload("a.png", &encode(create_test_image(8, 8), ImageFormat::Png));
    let other = Session::new();
    let err = lab
        .dispatcher
        .process(&other, &name, "gray", &Value::Null)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(lab.dispatcher.report(&other, &name).is_err());
}

#[test]
fn test_upload_limits() {
    let root = tempdir().unwrap();
    let mut config = LabConfig::with_dirs(root.path().join("u"), root.path().join("o"));
    config.limits.max_bytes = 64;
    let dispatcher = Dispatcher::new(config).unwrap();
    let session = Session::new();

    let big = encode(create_test_image(64, 64), ImageFormat::Png);
    let err = dispatcher.upload(&session, "big.png", &big).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    let err = dispatcher.upload(&session, "empty.png", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
    assert!(session.is_empty());
}
