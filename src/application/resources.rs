//! Theme stylesheets, scripts and generated webfont CSS.

use std::{io::ErrorKind, path::{Path, PathBuf}};

use crate::{
    application::{context::RequestContext, error::AppError},
    domain::{
        error::DomainError,
        resources::{InstalledTheme, InstalledWebfont},
    },
    infra::error::InfraError,
};

/// Accept plain file stems only, so requests cannot walk out of the asset tree.
pub fn safe_file_stem(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.contains(".."))
    .then_some(name)
}

/// The member's theme, else the configured default, else the flagged default,
/// else the first installed theme.
pub fn select_theme<'a>(
    themes: &'a [InstalledTheme],
    member_theme: Option<i64>,
    default_theme: Option<i64>,
) -> Option<&'a InstalledTheme> {
    let by_id = |id: Option<i64>| id.and_then(|id| themes.iter().find(|theme| theme.id == id));
    by_id(member_theme)
        .or_else(|| by_id(default_theme))
        .or_else(|| themes.iter().find(|theme| theme.is_default))
        .or_else(|| themes.first())
}

pub fn theme_css_path(themes_dir: &Path, theme: &InstalledTheme, file: &str) -> PathBuf {
    themes_dir
        .join(&theme.folder)
        .join("css")
        .join(format!("{file}.css"))
}

pub fn script_path(assets_dir: &Path, file: &str) -> PathBuf {
    assets_dir.join("js").join(format!("{file}.js"))
}

/// Read an asset; a missing file is a 404 rather than an I/O fault.
pub async fn read_asset(path: &Path) -> Result<String, AppError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::NotFound),
        Err(err) => Err(InfraError::file(path, err).into()),
    }
}

/// `@font-face` rules for every style and weight the webfont ships.
pub fn webfont_css(base_url: &str, font: &InstalledWebfont) -> Result<String, DomainError> {
    let base_url = base_url.trim_end_matches('/');
    let mut css = String::new();
    for (style, weights) in font.files()? {
        for (weight, file) in weights {
            css.push_str(&format!(
                "/* {style} */\n@font-face {{\n  font-family: '{family}';\n  font-style: {style};\n  font-weight: {weight};\n  font-display: swap;\n  src: url('{base_url}/public/webfonts/{folder}/{file}') format('woff2');\n",
                family = font.font_family_name,
                folder = font.folder,
            ));
            let ranges = font.unicode_ranges.trim();
            if !ranges.is_empty() {
                css.push_str(&format!("  unicode-range: {ranges};\n"));
            }
            css.push_str("}\n\n");
        }
    }
    Ok(css)
}

pub async fn theme_css(ctx: &RequestContext, file: &str) -> Result<String, AppError> {
    let file = safe_file_stem(file).ok_or(AppError::NotFound)?;
    let themes: Vec<InstalledTheme> = ctx.data()?.cache.decode("installed_themes")?;
    let theme = select_theme(
        &themes,
        ctx.member.theme_id,
        ctx.settings.default_theme_id,
    )
    .ok_or(AppError::NotFound)?;
    read_asset(&theme_css_path(&ctx.services.config.site.themes_dir, theme, file)).await
}

pub async fn script(ctx: &RequestContext, file: &str) -> Result<String, AppError> {
    let file = safe_file_stem(file).ok_or(AppError::NotFound)?;
    read_asset(&script_path(&ctx.services.config.site.assets_dir, file)).await
}

pub fn webfont(ctx: &RequestContext, family: &str) -> Result<String, AppError> {
    let fonts: Vec<InstalledWebfont> = ctx.data()?.cache.decode("installed_webfonts")?;
    let font = fonts
        .iter()
        .find(|font| font.font_family_name.eq_ignore_ascii_case(family.trim()))
        .ok_or(AppError::NotFound)?;
    Ok(webfont_css(&ctx.services.config.site.base_url, font)?)
}
