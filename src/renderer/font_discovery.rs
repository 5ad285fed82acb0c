//! Resolve font names to files via fontconfig

use anyhow::{Context, Result};
use fontconfig::{Fontconfig, Pattern};
use std::ffi::CString;
use std::path::PathBuf;
use tracing::debug;

/// Style suffixes recognised in full font names. Longer names come first so
/// "SemiBold Italic" is not read as "Bold Italic".
const KNOWN_STYLES: &[&str] = &[
    "SemiBold Italic",
    "Bold Italic",
    "Light Italic",
    "Medium Italic",
    "SemiBold",
    "Italic",
    "Oblique",
    "Bold",
    "Light",
    "Medium",
    "Regular",
];

/// Split "Family Style" into family and optional style
pub fn split_style(font_name: &str) -> (&str, Option<&'static str>) {
    let name = font_name.trim();
    for style in KNOWN_STYLES {
        if let Some(prefix) = name.strip_suffix(style) {
            if prefix.ends_with(' ') && !prefix.trim().is_empty() {
                return (prefix.trim_end(), Some(*style));
            }
        }
    }
    (name, None)
}

/// Best matching font file for a family or full font name
pub fn find_font_path(font_name: &str) -> Result<PathBuf> {
    let fc = Fontconfig::new().context("Failed to initialize fontconfig")?;
    let (family, style) = split_style(font_name);

    let mut pattern = Pattern::new(&fc);
    let family_cstr = CString::new(family).with_context(|| format!("Invalid family name: {family}"))?;
    pattern.add_string(fontconfig::FC_FAMILY, &family_cstr);
    if let Some(style) = style {
        let style_cstr = CString::new(style).with_context(|| format!("Invalid style name: {style}"))?;
        pattern.add_string(fontconfig::FC_STYLE, &style_cstr);
    }

    let matched = pattern.font_match();
    let path = matched
        .filename()
        .map(PathBuf::from)
        .with_context(|| format!("No font file found for '{font_name}'"))?;
    if !path.exists() {
        anyhow::bail!("Font file '{}' from fontconfig does not exist", path.display());
    }

    debug!(font = font_name, family, style = ?style, path = %path.display(), "Resolved font path");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_style() {
        assert_eq!(split_style("DejaVu Sans"), ("DejaVu Sans", None));
        assert_eq!(split_style("Roboto Mono Bold"), ("Roboto Mono", Some("Bold")));
        assert_eq!(split_style("Fira Sans SemiBold Italic"), ("Fira Sans", Some("SemiBold Italic")));
        // A bare style word is treated as a family name
        assert_eq!(split_style("Bold"), ("Bold", None));
        // Style must be a separate word
        assert_eq!(split_style("Ubuntu Medium"), ("Ubuntu", Some("Medium")));
        assert_eq!(split_style("SuperBold"), ("SuperBold", None));
    }
}
