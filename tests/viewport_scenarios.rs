use egui::{pos2, vec2};
use gencanvas::service::{self, EditRequest, ExpandRequest, GenerativeService, ServiceError};
use gencanvas::{
    BrushSettings, CanvasConfig, CanvasError, Command, EncodedImage, Handle, ImageMime, Query,
    QueryResult, Tool, ViewportCanvas, ViewportRect, ViewportState,
};
use image::{Rgba, RgbaImage};

fn encoded(w: u32, h: u32, mime: ImageMime) -> EncodedImage {
    let pixels = RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]));
    EncodedImage::encode(&pixels, mime, 90).unwrap()
}

fn state_with(w: u32, h: u32, container: (f32, f32)) -> ViewportState {
    ViewportState::new(CanvasConfig::default(), vec2(container.0, container.1))
        .execute(&Command::LoadImage(encoded(w, h, ImageMime::Png)))
        .unwrap()
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.01
}

#[test]
fn landscape_image_in_square_container() {
    let s = state_with(800, 600, (400.0, 400.0));
    let r = s.image_draw_rect();
    assert!(close(r.x, 0.0) && close(r.y, 50.0) && close(r.width, 400.0) && close(r.height, 300.0));
}

#[test]
fn bottom_right_drag_clamps_to_two_handles() {
    let s = state_with(100, 100, (100.0, 100.0))
        .execute(&Command::SetTool(Tool::Expand))
        .unwrap();
    let s = s
        .execute(&Command::DragHandle { handle: Handle::BottomRight, to: pos2(60.0, 60.0) })
        .unwrap();
    assert_eq!(s.canvas_rect(), ViewportRect::new(0.0, 0.0, 60.0, 60.0));
    let s = s
        .execute(&Command::DragHandle { handle: Handle::BottomRight, to: pos2(10.0, 10.0) })
        .unwrap();
    assert_eq!(s.canvas_rect(), ViewportRect::new(0.0, 0.0, 24.0, 24.0));
}

#[test]
fn sixteen_by_nine_preset_widens_and_recenters() {
    let s = state_with(800, 600, (400.0, 400.0))
        .execute(&Command::SetAspectRatio("16:9".to_string()))
        .unwrap();
    let c = s.canvas_rect();
    assert!(close(c.width, 533.33));
    assert!(close(c.height, 300.0));
    assert!(close(c.x, 200.0 - 533.33 / 2.0));
    assert!(close(c.y, 50.0));
}

#[test]
fn tall_preset_grows_height() {
    let s = state_with(800, 600, (400.0, 400.0))
        .execute(&Command::SetAspectRatio("1:1".to_string()))
        .unwrap();
    let c = s.canvas_rect();
    assert!(close(c.width, 400.0) && close(c.height, 400.0));
    assert!(c.contains_rect(&s.image_draw_rect()));
}

#[test]
fn composite_matches_native_size_for_any_container() {
    for container in [(400.0, 400.0), (123.0, 777.0), (1600.0, 90.0)] {
        let s = state_with(640, 480, container)
            .execute(&Command::SetTool(Tool::Paint))
            .unwrap()
            .execute(&Command::SetBrush(BrushSettings { size: 12.0, opacity: 1.0, hardness: 0.5 }))
            .unwrap();
        let center = s.image_draw_rect().center();
        let s = s
            .execute(&Command::PaintStroke { from: center, to: center + vec2(20.0, 5.0) })
            .unwrap();
        let payload = s.composite_image_with_mask().unwrap();
        assert_eq!((payload.width, payload.height), (640, 480));
        assert_eq!(payload.mime(), ImageMime::Png);
        let decoded = payload.image.decode().unwrap();
        assert_eq!((decoded.natural_width(), decoded.natural_height()), (640, 480));
    }
}

#[test]
fn jpeg_source_exports_jpeg_composite_and_png_expansion() {
    let s = ViewportState::new(CanvasConfig::default(), vec2(300.0, 300.0))
        .execute(&Command::LoadImage(encoded(90, 60, ImageMime::Jpeg)))
        .unwrap();
    assert_eq!(s.composite_image_with_mask().unwrap().mime(), ImageMime::Jpeg);

    let s = s.execute(&Command::SetAspectRatio("1:1".into())).unwrap();
    let expanded = s.final_expanded_image().unwrap();
    assert_eq!(expanded.mime(), ImageMime::Png);
    assert_eq!((expanded.width, expanded.height), (300, 300));
    let px = expanded.image.decode().unwrap();
    // Top band is new, transparent area.
    assert_eq!(px.pixels().get_pixel(150, 5).0[3], 0);
    assert_eq!(px.pixels().get_pixel(150, 150).0[3], 255);
}

#[test]
fn explicit_size_rejects_degenerate_input() {
    let s = state_with(100, 100, (200.0, 200.0));
    for (w, h) in [(0.0, 100.0), (100.0, -5.0), (23.0, 100.0), (f32::NAN, 50.0)] {
        let err = s.execute(&Command::SetExplicitSize { width: w, height: h }).unwrap_err();
        assert!(matches!(err, CanvasError::DegenerateGeometry { .. }), "{:?}", err);
    }
}

#[test]
fn data_uri_load_and_download() {
    let uri = encoded(16, 8, ImageMime::Png).to_data_uri();
    let s = ViewportState::new(CanvasConfig::default(), vec2(64.0, 64.0))
        .execute(&Command::LoadImage(EncodedImage::from_data_uri(&uri).unwrap()))
        .unwrap();
    match s.query(&Query::SourcePayload).unwrap() {
        QueryResult::Payload(p) => assert_eq!(p.to_data_uri(), uri),
        other => panic!("unexpected {:?}", other),
    }
}

/// Inverts whatever it is given, so re-entry is observable.
struct Inverter;

impl Inverter {
    fn invert(payload: &EncodedImage) -> Result<EncodedImage, ServiceError> {
        let mut px = payload
            .decode()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?
            .pixels()
            .clone();
        for p in px.pixels_mut() {
            p.0[0] = 255 - p.0[0];
        }
        EncodedImage::encode(&px, ImageMime::Png, 90).map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

impl GenerativeService for Inverter {
    fn submit_edit(&self, r: &EditRequest) -> Result<EncodedImage, ServiceError> {
        Self::invert(&r.payload.image)
    }
    fn submit_expand(&self, r: &ExpandRequest) -> Result<EncodedImage, ServiceError> {
        Self::invert(&r.payload.image)
    }
}

#[test]
fn edit_round_trip_through_host() {
    let mut canvas = ViewportCanvas::new(CanvasConfig::default(), vec2(400.0, 400.0));
    canvas.dispatch(&Command::LoadImage(encoded(200, 100, ImageMime::Png))).unwrap();
    canvas.dispatch(&Command::SetTool(Tool::Paint)).unwrap();
    canvas.dispatch(&Command::PointerDown(pos2(200.0, 200.0))).unwrap();
    canvas.dispatch(&Command::PointerMove(pos2(260.0, 210.0))).unwrap();
    canvas.dispatch(&Command::PointerUp).unwrap();
    assert_eq!(canvas.query(&Query::MaskIsEmpty).unwrap(), QueryResult::Flag(false));

    let before = canvas.state().session();
    let next = service::submit_for_edit(canvas.state(), &Inverter, "replace with sky").unwrap();
    assert_ne!(next.session(), before);
    assert!(next.mask().is_empty());
    assert_eq!(next.source().unwrap().natural_width(), 200);
    assert!(next.session_info().edited);

    let reverted = next.execute(&Command::RevertToOriginal).unwrap();
    assert!(!reverted.session_info().edited);
}

#[test]
fn failed_service_call_keeps_state() {
    struct Down;
    impl GenerativeService for Down {
        fn submit_edit(&self, _: &EditRequest) -> Result<EncodedImage, ServiceError> {
            Err(ServiceError::Transport("connection refused".into()))
        }
        fn submit_expand(&self, _: &ExpandRequest) -> Result<EncodedImage, ServiceError> {
            Err(ServiceError::ContentPolicy("blocked".into()))
        }
    }

    let s = state_with(50, 50, (100.0, 100.0));
    let err = service::submit_for_expand(&s, &Down).unwrap_err();
    assert_eq!(err, CanvasError::ExternalService(ServiceError::ContentPolicy("blocked".into())));
    assert!(s.is_loaded());
}
