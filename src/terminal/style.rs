//! Cell style attributes and styled-run representation used by
//! `TerminalModel::snapshot`.

use alacritty_terminal::term::cell::Flags as CellFlags;
use alacritty_terminal::vte::ansi::{Color as AlacColor, NamedColor};
use serde::{Deserialize, Serialize};

/// A cell foreground/background color, decoupled from alacritty's
/// internal `Color` type so the rest of the crate (and the wire
/// protocol) doesn't need to depend on VT-library internals directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl From<AlacColor> for Color {
    fn from(c: AlacColor) -> Self {
        match c {
            AlacColor::Spec(rgb) => Color::Rgb(rgb.r, rgb.g, rgb.b),
            AlacColor::Indexed(i) => Color::Indexed(i),
            AlacColor::Named(NamedColor::Foreground) | AlacColor::Named(NamedColor::Background) => {
                Color::Default
            }
            AlacColor::Named(named) => Color::Indexed(named as u8),
        }
    }
}

/// SGR-relevant style attributes for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
    pub blink: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fg: Color::Default,
            bg: Color::Default,
            bold: false,
            italic: false,
            underline: false,
            inverse: false,
            blink: false,
        }
    }
}

impl Style {
    pub fn from_flags(fg: AlacColor, bg: AlacColor, flags: CellFlags) -> Self {
        Self {
            fg: fg.into(),
            bg: bg.into(),
            bold: flags.contains(CellFlags::BOLD),
            italic: flags.contains(CellFlags::ITALIC),
            underline: flags.intersects(CellFlags::UNDERLINE | CellFlags::DOUBLE_UNDERLINE),
            inverse: flags.contains(CellFlags::INVERSE),
            blink: false,
        }
    }

    /// SGR parameter codes (without the leading/trailing `\x1b[`/`m`) that
    /// reproduce this style from a reset state.
    pub fn sgr_params(&self) -> Vec<u32> {
        let mut params = vec![0];
        if self.bold {
            params.push(1);
        }
        if self.italic {
            params.push(3);
        }
        if self.underline {
            params.push(4);
        }
        if self.blink {
            params.push(5);
        }
        if self.inverse {
            params.push(7);
        }
        match self.fg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => params.push(30 + i as u32),
            Color::Indexed(i) if i < 16 => params.push(90 + (i as u32 - 8)),
            Color::Indexed(i) => {
                params.push(38);
                params.push(5);
                params.push(i as u32);
            }
            Color::Rgb(r, g, b) => {
                params.push(38);
                params.push(2);
                params.push(r as u32);
                params.push(g as u32);
                params.push(b as u32);
            }
        }
        match self.bg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => params.push(40 + i as u32),
            Color::Indexed(i) if i < 16 => params.push(100 + (i as u32 - 8)),
            Color::Indexed(i) => {
                params.push(48);
                params.push(5);
                params.push(i as u32);
            }
            Color::Rgb(r, g, b) => {
                params.push(48);
                params.push(2);
                params.push(r as u32);
                params.push(g as u32);
                params.push(b as u32);
            }
        }
        params
    }
}

/// A maximal run of cells on one row sharing a single style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledRun {
    pub row: usize,
    pub col: usize,
    pub text: String,
    pub style: Style,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_has_no_sgr_params_besides_reset() {
        let style = Style::default();
        assert_eq!(style.sgr_params(), vec![0]);
    }

    #[test]
    fn bold_and_indexed_fg_produce_expected_params() {
        let style = Style {
            bold: true,
            fg: Color::Indexed(1),
            ..Style::default()
        };
        assert_eq!(style.sgr_params(), vec![0, 1, 31]);
    }

    #[test]
    fn truecolor_fg_produces_38_2_triplet() {
        let style = Style {
            fg: Color::Rgb(10, 20, 30),
            ..Style::default()
        };
        assert_eq!(style.sgr_params(), vec![0, 38, 2, 10, 20, 30]);
    }

    #[test]
    fn high_indexed_color_uses_256_color_escape() {
        let style = Style {
            fg: Color::Indexed(200),
            ..Style::default()
        };
        assert_eq!(style.sgr_params(), vec![0, 38, 5, 200]);
    }
}
