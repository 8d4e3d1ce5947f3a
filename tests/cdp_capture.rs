#![cfg(feature = "cdp")]

use pagestitch::cdp::CdpSurface;
use pagestitch::{CaptureConfig, CaptureSurface, Stitcher, Viewport};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

const PAGE: &str = r#"<!doctype html>
<html><head><style>
  body { margin: 0; }
  #site-header { position: fixed; top: 0; left: 0; right: 0; height: 40px; background: rgb(255, 0, 0); }
  .block { height: 500px; }
</style></head>
<body>
  <div id="site-header"></div>
  <div class="block" style="background: rgb(0, 128, 0)"></div>
  <div class="block" style="background: rgb(0, 0, 128)"></div>
  <div class="block" style="background: rgb(0, 128, 128)"></div>
  <div id="wpvfh-container" style="position: fixed; bottom: 0; right: 0; width: 50px; height: 50px; background: rgb(255, 0, 0)"></div>
</body></html>"#;

const WIDE_PAGE: &str = r#"<!doctype html>
<html><head><style>
  body { margin: 0; background: rgb(255, 255, 255); }
  #strip { width: 1600px; height: 700px; background: linear-gradient(to right, rgb(0, 128, 0) 0 1200px, rgb(0, 0, 160) 1200px); }
</style></head>
<body><div id="strip"></div></body></html>"#;

fn serve_page() -> String {
    serve(PAGE)
}

fn serve(html: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let header = Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..]).unwrap();
            let _ = request.respond(Response::from_string(html).with_header(header));
        }
    });
    format!("http://{}", addr)
}

#[test]
#[ignore = "requires a local Chrome/Chromium"]
fn stitches_a_live_page_without_the_fixed_header() {
    let url = serve_page();
    let surface = CdpSurface::launch(Viewport { width: 400, height: 300 }).expect("launch chrome");
    surface.navigate(&url).expect("navigate");

    let mut stitcher = Stitcher::new(surface);
    let config = CaptureConfig {
        scroll_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let image = stitcher.capture_full_page(&config).expect("capture");

    assert_eq!(image.geometry.page_height, 1500);
    assert!(image.tiles > 1);
    let red = image
        .bitmap
        .pixels()
        .filter(|p| p[0] > 200 && p[1] < 50 && p[2] < 50)
        .count();
    assert_eq!(red, 0, "fixed header or overlay leaked into the composite");

    let scroll = stitcher.surface().scroll_position().expect("scroll");
    assert_eq!(scroll.y, 0.0);
}

#[test]
#[ignore = "requires a local Chrome/Chromium"]
fn renders_columns_beyond_the_viewport_width() {
    let url = serve(WIDE_PAGE);
    let surface = CdpSurface::launch(Viewport { width: 400, height: 300 }).expect("launch chrome");
    surface.navigate(&url).expect("navigate");

    let mut stitcher = Stitcher::new(surface);
    let config = CaptureConfig {
        scroll_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let image = stitcher.capture_full_page(&config).expect("capture");

    assert_eq!(image.bitmap.width(), image.geometry.page_width);
    assert!(image.geometry.page_width >= 1600);
    for y in [10, 350, 690] {
        let p = image.bitmap.get_pixel(1500, y);
        assert!(p[2] > 120 && p[0] < 40 && p[1] < 40, "column 1500 at y={} is {:?}, not page content", y, p);
    }
}
