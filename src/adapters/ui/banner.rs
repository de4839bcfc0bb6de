//! Startup banner: "CATASTRO" in figlet with a vertical gradient.

use crossterm::ExecutableCommand;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use figlet_rs::FIGfont;
use std::io::{Write, stdout};

/// Terracotta (#c8553d).
const TERRACOTTA: (u8, u8, u8) = (0xc8, 0x55, 0x3d);
/// Olive (#8a9a5b).
const OLIVE: (u8, u8, u8) = (0x8a, 0x9a, 0x5b);

/// Linear interpolation between two RGB colors. `t` in [0.0, 1.0].
fn lerp_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f64) -> (u8, u8, u8) {
    let r = (f64::from(a.0) * (1.0 - t) + f64::from(b.0) * t).round() as u8;
    let g = (f64::from(a.1) * (1.0 - t) + f64::from(b.1) * t).round() as u8;
    let bl = (f64::from(a.2) * (1.0 - t) + f64::from(b.2) * t).round() as u8;
    (r, g, bl)
}

fn render_art(text: &str) -> String {
    FIGfont::standard()
        .ok()
        .and_then(|font| font.convert(text).map(|fig| fig.to_string()))
        .unwrap_or_else(|| format!("{}\n", text))
}

/// Prints the banner, then version and a one-line description.
pub fn print_welcome() {
    let mut out = stdout();
    let art = render_art("CATASTRO");
    let lines: Vec<&str> = art.lines().collect();
    let total = lines.len().max(1);

    for (i, line) in lines.iter().enumerate() {
        let t = if total <= 1 {
            1.0
        } else {
            i as f64 / (total - 1) as f64
        };
        let (r, g, b) = lerp_rgb(TERRACOTTA, OLIVE, t);
        let _ = out.execute(SetForegroundColor(Color::Rgb { r, g, b }));
        let _ = out.execute(Print(line));
        let _ = out.execute(Print("\r\n"));
        let _ = out.execute(ResetColor);
    }

    let _ = out.execute(SetForegroundColor(Color::Rgb {
        r: OLIVE.0,
        g: OLIVE.1,
        b: OLIVE.2,
    }));
    let _ = out.execute(Print(format!("v{}\r\n", env!("CARGO_PKG_VERSION"))));
    let _ = out.execute(Print("Parcel affection analysis\r\n"));
    let _ = out.execute(ResetColor);
    let _ = out.flush();
}
