//! Installer-facing category bundles.
//!
//! A closed set of named bundles of default domains that seed the initial
//! blocklist. The domain lists are a static resource, not part of any wire
//! contract.

use std::collections::BTreeSet;

/// A named bundle of default blocked domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Social networks and micro-blogging.
    Social,
    /// Video streaming.
    Video,
    /// News and link aggregators.
    News,
    /// Online shopping.
    Shopping,
    /// Adult content.
    Adult,
    /// Gambling and betting.
    Gambling,
}

impl Category {
    /// Every known category.
    pub const ALL: [Self; 6] = [
        Self::Social,
        Self::Video,
        Self::News,
        Self::Shopping,
        Self::Adult,
        Self::Gambling,
    ];

    /// The categories seeded on a fresh install.
    pub const DEFAULT: [Self; 4] = [Self::Social, Self::Video, Self::News, Self::Adult];

    /// The canonical domains in this bundle.
    #[must_use]
    pub const fn domains(self) -> &'static [&'static str] {
        match self {
            Self::Social => &[
                "twitter.com",
                "x.com",
                "facebook.com",
                "instagram.com",
                "tiktok.com",
                "reddit.com",
                "threads.net",
                "snapchat.com",
                "linkedin.com",
                "pinterest.com",
                "tumblr.com",
                "mastodon.social",
                "bsky.app",
            ],
            Self::Video => &[
                "youtube.com",
                "twitch.tv",
                "netflix.com",
                "hulu.com",
                "vimeo.com",
                "dailymotion.com",
                "disneyplus.com",
                "max.com",
            ],
            Self::News => &[
                "news.ycombinator.com",
                "cnn.com",
                "bbc.com",
                "nytimes.com",
                "foxnews.com",
                "theguardian.com",
                "washingtonpost.com",
                "news.google.com",
                "drudgereport.com",
            ],
            Self::Shopping => &[
                "amazon.com",
                "ebay.com",
                "etsy.com",
                "aliexpress.com",
                "temu.com",
                "walmart.com",
                "target.com",
            ],
            Self::Adult => &[
                "pornhub.com",
                "xvideos.com",
                "xnxx.com",
                "xhamster.com",
                "redtube.com",
                "youporn.com",
                "onlyfans.com",
            ],
            Self::Gambling => &[
                "draftkings.com",
                "fanduel.com",
                "bet365.com",
                "bovada.lv",
                "pokerstars.com",
                "stake.com",
            ],
        }
    }

    /// Parses a category name as accepted by the installer.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "social" => Some(Self::Social),
            "video" => Some(Self::Video),
            "news" => Some(Self::News),
            "shopping" => Some(Self::Shopping),
            "adult" => Some(Self::Adult),
            "gambling" => Some(Self::Gambling),
            _ => None,
        }
    }
}

/// The union of the given bundles, in canonical set form.
#[must_use]
pub fn seed_domains(categories: &[Category]) -> BTreeSet<String> {
    categories
        .iter()
        .flat_map(|c| c.domains().iter().map(|d| (*d).to_string()))
        .collect()
}

/// The default seed set (`social`, `video`, `news`, `adult`).
#[must_use]
pub fn default_seed() -> BTreeSet<String> {
    seed_domains(&Category::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_is_nonempty_and_canonical() {
        let seed = default_seed();
        assert!(seed.len() > 20);
        assert!(seed.contains("twitter.com"));
        assert!(seed.contains("youtube.com"));
        assert!(!seed.contains("amazon.com"), "shopping is not a default");
        for d in &seed {
            assert_eq!(crate::domain::canonicalize(d).unwrap(), *d);
        }
    }

    #[test]
    fn parse_accepts_known_names_only() {
        assert_eq!(Category::parse("Social"), Some(Category::Social));
        assert_eq!(Category::parse("gambling"), Some(Category::Gambling));
        assert_eq!(Category::parse("work"), None);
    }
}
