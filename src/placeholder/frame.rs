//! Frame layout for the placeholder video.

use super::font::{draw_text, line_height, text_width};
use image::{Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BANNER: Rgb<u8> = Rgb([200, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GRAY: Rgb<u8> = Rgb([150, 150, 150]);

const TEXT_SCALE: u32 = 2;
const BANNER_MARGIN_X: u32 = 100;
const BANNER_TOP: u32 = 140;
const BANNER_BOTTOM: u32 = 180;
const CAPTION_Y: u32 = 205;
const PROMPT_Y: u32 = 245;
const PROMPT_LINE_STEP: u32 = 30;
const FOOTER_MARGIN: u32 = 20;

/// Splits `prompt` into lines shorter than `width` characters, keeping at most `max_lines`.
///
/// Words longer than a line are hard-split so nothing is drawn off-frame.
pub(crate) fn wrap_prompt(prompt: &str, width: usize, max_lines: usize) -> Vec<String> {
    let width = width.max(2);
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in prompt.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() >= width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let rest = word.split_off(width - 1);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }

        let needed = if line.is_empty() {
            word.len()
        } else {
            line.chars().count() + 1 + word.len()
        };
        if needed >= width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.truncate(max_lines);
    lines
}

/// Frame geometry and text content shared by every frame of one video.
#[derive(Debug, Clone)]
pub(crate) struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub total_frames: u32,
    pub reason: String,
    pub prompt_lines: Vec<String>,
}

impl FrameLayout {
    /// Renders everything except the frame counter.
    pub fn render_base(&self) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

        let banner_right = self.width.saturating_sub(BANNER_MARGIN_X);
        for y in BANNER_TOP..BANNER_BOTTOM.min(self.height) {
            for x in BANNER_MARGIN_X..banner_right {
                image.put_pixel(x, y, BANNER);
            }
        }

        let banner_width = banner_right.saturating_sub(BANNER_MARGIN_X);
        let reason = fit_to_width(&self.reason, banner_width.saturating_sub(16), TEXT_SCALE);
        let reason_y = BANNER_TOP + (BANNER_BOTTOM - BANNER_TOP - line_height(TEXT_SCALE)) / 2;
        self.draw_centered(&mut image, &reason, reason_y, WHITE);

        self.draw_centered(&mut image, "Your prompt:", CAPTION_Y, YELLOW);

        let mut y = PROMPT_Y;
        for line in &self.prompt_lines {
            self.draw_centered(&mut image, line, y, WHITE);
            y += PROMPT_LINE_STEP;
        }

        image
    }

    /// Renders frame `index` (zero-based) on top of `base`.
    pub fn render_frame(&self, base: &RgbImage, index: u32) -> RgbImage {
        let mut image = base.clone();
        let label = format!("Frame {}/{}", index + 1, self.total_frames);
        let y = self
            .height
            .saturating_sub(FOOTER_MARGIN + line_height(TEXT_SCALE));
        draw_text(&mut image, &label, FOOTER_MARGIN, y, TEXT_SCALE, GRAY);
        image
    }

    fn draw_centered(&self, image: &mut RgbImage, text: &str, y: u32, color: Rgb<u8>) {
        let x = self.width.saturating_sub(text_width(text, TEXT_SCALE)) / 2;
        draw_text(image, text, x, y, TEXT_SCALE, color);
    }
}

/// Truncates `text` with an ellipsis so it fits in `max_width` pixels.
fn fit_to_width(text: &str, max_width: u32, scale: u32) -> String {
    if text_width(text, scale) <= max_width {
        return text.to_string();
    }
    let mut fitted: String = String::new();
    for c in text.chars() {
        let candidate = format!("{fitted}{c}...");
        if text_width(&candidate, scale) > max_width {
            break;
        }
        fitted.push(c);
    }
    format!("{}...", fitted.trim_end())
}
