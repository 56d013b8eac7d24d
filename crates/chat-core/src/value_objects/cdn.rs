//! CDN image URL construction
//!
//! Entity records store image hashes only; URLs are derived on demand.

use std::fmt;

use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Default CDN root
pub const DEFAULT_CDN_URL: &str = "https://cdn.discordapp.com";

/// Image file format accepted by the CDN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFormat {
    /// File extension used in the URL
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Options for a rendered image URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageOptions {
    /// Explicit format. Animated hashes default to gif when unset.
    pub format: Option<ImageFormat>,
    /// Requested edge size; must be a power of two in 16..=4096
    pub size: Option<u16>,
}

impl ImageOptions {
    #[must_use]
    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn size(mut self, size: u16) -> Self {
        self.size = Some(size);
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self.size {
            Some(size) if !(16..=4096).contains(&size) || !size.is_power_of_two() => {
                Err(DomainError::InvalidImageSize(size))
            }
            _ => Ok(()),
        }
    }
}

/// URL builder for CDN-hosted images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cdn {
    base: String,
}

impl Default for Cdn {
    fn default() -> Self {
        Self::new(DEFAULT_CDN_URL)
    }
}

impl Cdn {
    /// Create a builder rooted at `base` (trailing slash is ignored)
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    /// Built-in avatar for users without a custom one
    #[must_use]
    pub fn default_avatar(&self, index: u64) -> String {
        format!("{}/embed/avatars/{index}.png", self.base)
    }

    /// User avatar
    pub fn avatar(
        &self,
        user_id: Snowflake,
        hash: &str,
        options: ImageOptions,
    ) -> Result<String, DomainError> {
        self.hashed("avatars", user_id, hash, options)
    }

    /// User banner
    pub fn banner(
        &self,
        user_id: Snowflake,
        hash: &str,
        options: ImageOptions,
    ) -> Result<String, DomainError> {
        self.hashed("banners", user_id, hash, options)
    }

    /// Guild icon
    pub fn icon(
        &self,
        guild_id: Snowflake,
        hash: &str,
        options: ImageOptions,
    ) -> Result<String, DomainError> {
        self.hashed("icons", guild_id, hash, options)
    }

    fn hashed(
        &self,
        route: &str,
        id: Snowflake,
        hash: &str,
        options: ImageOptions,
    ) -> Result<String, DomainError> {
        options.validate()?;
        let format = options.format.unwrap_or(if hash.starts_with("a_") {
            ImageFormat::Gif
        } else {
            ImageFormat::Png
        });
        let mut url = format!("{}/{route}/{id}/{hash}.{format}", self.base);
        if let Some(size) = options.size {
            url.push_str(&format!("?size={size}"));
        }
        Ok(url)
    }
}
