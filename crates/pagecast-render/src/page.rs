//! Browser flags and page scripts.

use crate::DESKTOP_USER_AGENT;

/// Hides scrollbars and zeroes page margins so the page fills the frame.
pub const STYLE_SCRIPT: &str = r#"(() => {
  const style = document.createElement('style');
  style.id = 'pagecast-overrides';
  style.textContent = `
    ::-webkit-scrollbar { display: none !important; width: 0 !important; height: 0 !important; }
    html, body { margin: 0 !important; padding: 0 !important; overflow: hidden !important; scrollbar-width: none !important; }
  `;
  (document.head || document.documentElement).appendChild(style);
  return true;
})()"#;

/// Scrolls the page so the relevant content sits inside the captured frame.
pub fn scroll_script(offset: u32) -> String {
    format!("window.scrollTo(0, {offset}); window.scrollY")
}

/// Viewport center, where the synthetic click lands.
pub fn click_point(width: u32, height: u32) -> (f64, f64) {
    (f64::from(width) / 2.0, f64::from(height) / 2.0)
}

/// Extra browser flags for kiosk rendering on a GPU-less virtual display.
pub fn launch_args(display_id: &str, width: u32, height: u32) -> Vec<String> {
    vec![
        format!("--display={display_id}"),
        "--kiosk".to_string(),
        "--start-fullscreen".to_string(),
        "--window-position=0,0".to_string(),
        format!("--window-size={width},{height}"),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
        "--no-first-run".to_string(),
        "--noerrdialogs".to_string(),
        "--disable-infobars".to_string(),
        "--hide-scrollbars".to_string(),
        format!("--user-agent={DESKTOP_USER_AGENT}"),
    ]
}
