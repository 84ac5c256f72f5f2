//! SRT to ASS subtitle conversion

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use strmwarp_proxy::{BufferedResponse, ResponseTransform};

/// `00:01:02,345 --> 00:01:04,000`
static TIMING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})")
        .expect("Invalid subtitle regex")
});

static FONT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?font[^>]*>").expect("Invalid subtitle regex"));

static STYLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)([biu])>").expect("Invalid subtitle regex"));

pub const DEFAULT_ASS_STYLE: &str = "Style: Default,Microsoft YaHei,60,&H00FFFFFF,&H000000FF,&H00000000,&H80000000,0,0,0,0,100,100,0,0,1,2,1,2,10,10,30,1";

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Whether `body` looks like SubRip: a numeric cue index followed by a timing line.
#[must_use]
pub fn is_srt(body: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    let mut lines = strip_bom(text).lines().map(str::trim).skip_while(|l| l.is_empty());
    let (Some(index), Some(timing)) = (lines.next(), lines.next()) else {
        return false;
    };
    !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) && TIMING_LINE.is_match(timing)
}

/// `h:mm:ss.cc` from SRT timestamp captures
fn ass_time(h: &str, m: &str, s: &str, frac: &str) -> String {
    let millis: u32 = format!("{frac:0<3}").parse().unwrap_or(0);
    let hours: u32 = h.parse().unwrap_or(0);
    format!("{hours}:{m}:{s}.{:02}", millis / 10)
}

fn ass_text(lines: &[&str]) -> String {
    let joined = lines.join("\\N");
    let joined = FONT_TAG.replace_all(&joined, "");
    STYLE_TAG
        .replace_all(&joined, |caps: &regex::Captures<'_>| {
            let on = if caps[1].is_empty() { 1 } else { 0 };
            format!("{{\\{}{on}}}", caps[2].to_lowercase())
        })
        .into_owned()
}

/// Convert an SRT document to an ASS script using `styles` as `Style:` lines.
#[must_use]
pub fn srt_to_ass(srt: &str, styles: &[String]) -> String {
    let mut out = String::from(
        "[Script Info]\nScriptType: v4.00+\nPlayResX: 1920\nPlayResY: 1080\nWrapStyle: 0\n\n\
         [V4+ Styles]\nFormat: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
         Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, \
         Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    if styles.is_empty() {
        out.push_str(DEFAULT_ASS_STYLE);
        out.push('\n');
    } else {
        for style in styles {
            out.push_str(style);
            out.push('\n');
        }
    }
    out.push_str("\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");

    let text = strip_bom(srt).replace("\r\n", "\n");
    for block in text.split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(timing_at) = lines.iter().position(|l| TIMING_LINE.is_match(l)) else {
            continue;
        };
        let Some(caps) = TIMING_LINE.captures(lines[timing_at]) else {
            continue;
        };
        let start = ass_time(&caps[1], &caps[2], &caps[3], &caps[4]);
        let end = ass_time(&caps[5], &caps[6], &caps[7], &caps[8]);
        out.push_str(&format!(
            "Dialogue: 0,{start},{end},Default,,0,0,0,,{}\n",
            ass_text(&lines[timing_at + 1..])
        ));
    }
    out
}

/// Converts SRT subtitle responses to ASS; other formats pass unchanged.
pub struct SubtitleTransform {
    styles: Vec<String>,
}

impl SubtitleTransform {
    pub fn new(styles: Vec<String>) -> Self {
        Self { styles }
    }
}

#[async_trait]
impl ResponseTransform for SubtitleTransform {
    fn name(&self) -> &'static str {
        "subtitle"
    }

    async fn transform(&self, response: &mut BufferedResponse) -> anyhow::Result<()> {
        if !is_srt(&response.body) {
            return Ok(());
        }
        let srt = std::str::from_utf8(&response.body)?;
        let ass = srt_to_ass(srt, &self.styles);
        tracing::info!("Converted SRT subtitle to ASS");
        response.set_body(ass);
        Ok(())
    }
}
