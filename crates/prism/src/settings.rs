//! JSON settings documents for sources.
//!
//! Recognised keys: `"pixel format"`, `"width"`, `"height"`, `"fps"`,
//! `"brightness"`, `"white balance"` and `"exposure"`. The last two take
//! `"auto"`, `"hold"` or an integer.

use prism_core::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{error::SourceError, source::Source};

#[derive(Deserialize)]
#[serde(untagged)]
enum Control {
    Manual(i32),
    Named(String),
}

pub(crate) fn apply<S: Source + ?Sized>(source: &S, json: &str) -> Result<(), SourceError> {
    let doc: Map<String, Value> = serde_json::from_str(json)?;
    let name = source.name();

    let mut mode = VideoMode::default();
    if let Some(value) = doc.get("pixel format") {
        match value.as_str().map(str::parse::<PixelFormat>) {
            Some(Ok(pixel_format)) => mode.pixel_format = pixel_format,
            _ => warn!(source = name, %value, "could not understand pixel format"),
        }
    }
    mode.width = read_u32(&doc, "width", name);
    mode.height = read_u32(&doc, "height", name);
    mode.fps = read_u32(&doc, "fps", name);

    if mode.is_complete() {
        info!(
            source = name,
            pixel_format = %mode.pixel_format,
            width = mode.width,
            height = mode.height,
            fps = mode.fps,
            "setting video mode"
        );
        report(name, "video mode", source.set_video_mode(mode));
    } else {
        if mode.pixel_format != PixelFormat::Unknown {
            info!(source = name, pixel_format = %mode.pixel_format, "setting pixel format");
            report(name, "pixel format", source.set_pixel_format(mode.pixel_format));
        }
        if mode.width != 0 && mode.height != 0 {
            info!(source = name, width = mode.width, height = mode.height, "setting resolution");
            report(name, "resolution", source.set_resolution(mode.width, mode.height));
        }
        if mode.fps != 0 {
            info!(source = name, fps = mode.fps, "setting fps");
            report(name, "fps", source.set_fps(mode.fps));
        }
    }

    if let Some(value) = doc.get("brightness") {
        match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
            Some(brightness) => {
                info!(source = name, brightness, "setting brightness");
                report(name, "brightness", source.set_brightness(brightness));
            }
            None => warn!(source = name, %value, "could not read brightness"),
        }
    }

    if let Some(value) = doc.get("white balance") {
        let result = match control(value) {
            Some(Control::Named(s)) if s.eq_ignore_ascii_case("auto") => {
                Some(source.set_white_balance_auto())
            }
            Some(Control::Named(s)) if s.eq_ignore_ascii_case("hold") => {
                Some(source.set_white_balance_hold_current())
            }
            Some(Control::Manual(v)) => Some(source.set_white_balance_manual(v)),
            _ => None,
        };
        match result {
            Some(result) => {
                info!(source = name, %value, "setting white balance");
                report(name, "white balance", result);
            }
            None => warn!(source = name, %value, "could not understand white balance"),
        }
    }

    if let Some(value) = doc.get("exposure") {
        let result = match control(value) {
            Some(Control::Named(s)) if s.eq_ignore_ascii_case("auto") => {
                Some(source.set_exposure_auto())
            }
            Some(Control::Named(s)) if s.eq_ignore_ascii_case("hold") => {
                Some(source.set_exposure_hold_current())
            }
            Some(Control::Manual(v)) => Some(source.set_exposure_manual(v)),
            _ => None,
        };
        match result {
            Some(result) => {
                info!(source = name, %value, "setting exposure");
                report(name, "exposure", result);
            }
            None => warn!(source = name, %value, "could not understand exposure"),
        }
    }

    Ok(())
}

/// The set fields of `mode` as a pretty-printed document.
pub(crate) fn render(mode: &VideoMode) -> String {
    let mut doc = Map::new();
    if mode.pixel_format != PixelFormat::Unknown {
        doc.insert("pixel format".into(), mode.pixel_format.name().into());
    }
    if mode.width != 0 {
        doc.insert("width".into(), mode.width.into());
    }
    if mode.height != 0 {
        doc.insert("height".into(), mode.height.into());
    }
    if mode.fps != 0 {
        doc.insert("fps".into(), mode.fps.into());
    }
    serde_json::to_string_pretty(&Value::Object(doc)).unwrap_or_default()
}

fn control(value: &Value) -> Option<Control> {
    Control::deserialize(value).ok()
}

fn read_u32(doc: &Map<String, Value>, key: &str, source: &str) -> u32 {
    let Some(value) = doc.get(key) else {
        return 0;
    };
    match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
        Some(v) => v,
        None => {
            warn!(source, key, %value, "could not read setting");
            0
        }
    }
}

fn report(source: &str, setting: &str, result: Result<(), SourceError>) {
    if let Err(err) = result {
        warn!(source, setting, %err, "could not apply setting");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::source::SourceCore;

    struct Recorder {
        core: SourceCore,
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                core: SourceCore::new("recorder"),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn log(&self, call: impl Into<String>) -> Result<(), SourceError> {
            self.calls.lock().push(call.into());
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Source for Recorder {
        fn core(&self) -> &SourceCore {
            &self.core
        }

        fn kind(&self) -> &'static str {
            "recorder"
        }

        fn set_video_mode(&self, mode: VideoMode) -> Result<(), SourceError> {
            self.core.set_mode(mode);
            self.log(format!(
                "mode {} {}x{} {}",
                mode.pixel_format, mode.width, mode.height, mode.fps
            ))
        }

        fn set_brightness(&self, brightness: i32) -> Result<(), SourceError> {
            self.log(format!("brightness {brightness}"))
        }

        fn set_white_balance_auto(&self) -> Result<(), SourceError> {
            self.log("wb auto")
        }

        fn set_exposure_manual(&self, value: i32) -> Result<(), SourceError> {
            self.log(format!("exposure {value}"))
        }

        fn set_exposure_hold_current(&self) -> Result<(), SourceError> {
            self.log("exposure hold")
        }
    }

    #[test]
    fn complete_mode_is_applied_at_once() {
        let source = Recorder::new();
        source
            .set_settings_json(
                r#"{"pixel format": "YUYV", "width": 320, "height": 240, "fps": 15,
                    "brightness": 40, "white balance": "Auto", "exposure": 12}"#,
            )
            .unwrap();
        assert_eq!(
            source.calls(),
            vec!["mode yuyv 320x240 15", "brightness 40", "wb auto", "exposure 12"]
        );
    }

    #[test]
    fn partial_mode_is_applied_piecemeal() {
        let source = Recorder::new();
        source.core.set_mode(VideoMode::new(PixelFormat::Bgr, 640, 480, 30));
        source
            .set_settings_json(r#"{"width": 160, "height": 120, "exposure": "hold"}"#)
            .unwrap();
        assert_eq!(
            source.calls(),
            vec!["mode bgr 160x120 30", "exposure hold"]
        );
    }

    #[test]
    fn bad_values_are_skipped() {
        let source = Recorder::new();
        source
            .set_settings_json(
                r#"{"pixel format": "nv12", "fps": -3, "white balance": "sunny", "brightness": "max"}"#,
            )
            .unwrap();
        assert!(source.calls().is_empty());
    }

    #[test]
    fn unsupported_controls_do_not_fail_the_document() {
        let source = Recorder::new();
        source
            .set_settings_json(r#"{"white balance": 4500, "fps": 10}"#)
            .unwrap();
        assert_eq!(source.calls(), vec!["mode unknown 0x0 10"]);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let source = Recorder::new();
        assert!(matches!(
            source.set_settings_json("[1, 2]"),
            Err(SourceError::Settings(_))
        ));
        assert!(source.set_settings_json("{").is_err());
    }

    #[test]
    fn render_lists_set_fields_only() {
        let json = render(&VideoMode::new(PixelFormat::Mjpeg, 640, 0, 30));
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pixel format"], "mjpeg");
        assert_eq!(value["width"], 640);
        assert_eq!(value["fps"], 30);
        assert!(value.get("height").is_none());
    }
}
