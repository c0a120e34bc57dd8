//! Release title parsing, filtering and ranking
//!
//! Scrapers return raw torrent names such as
//! `Show.Name.S01E02E03.1080p.WEB-DL.DDP5.1.H.264-GROUP`. This module pulls
//! the interesting attributes out of them, decides whether a release is
//! acceptable under the parser settings and orders candidates.

use crate::settings::ParserSettings;
use mediaferry_common::media::Stream;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;

/// Attributes extracted from a release name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRelease {
    pub title: String,
    pub year: Option<i32>,
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub codec: Option<String>,
    pub audio: Option<String>,
    pub network: Option<String>,
    pub seasons: Vec<u32>,
    pub episodes: Vec<u32>,
    pub languages: Vec<String>,
    pub hdr: bool,
    pub proper: bool,
    pub repack: bool,
    pub remux: bool,
    pub upscaled: bool,
    pub extended: bool,
    pub dual_audio: bool,
}

pub(crate) fn re(pattern: &str) -> Regex {
    // Patterns are literals in this file
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid release pattern {}: {}", pattern, e))
}

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(2160p|4k|uhd|1080[pi]|720p|576p|480p|360p)\b"));
static YEAR: Lazy<Regex> = Lazy::new(|| re(r"\b((?:19|20)\d{2})\b"));
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bS(\d{1,2})[ ._-]?E(\d{1,4})((?:[ ._]?-?[ ._]?E\d{1,4}|[ ._]?-[ ._]?\d{1,4}\b)*)")
});
static EPISODE_TOKEN: Lazy<Regex> = Lazy::new(|| re(r"(?i)(-)?[ ._]?E?(\d{1,4})"));
static CROSS_EPISODE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(\d{1,2})x(\d{2,3})\b"));
static SEASON_PACK: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bS(\d{1,2})(?:[ ._]?-[ ._]?S?(\d{1,2}))?\b"));
static SEASON_WORD: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bseasons?[ ._-]?(\d{1,2})(?:[ ._]?(?:-|to)[ ._]?(\d{1,2}))?\b")
});
static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| re(r"^\s*\[[^\]]*\]\s*"));

static QUALITIES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:hd-?)?cam(?:rip)?\b"), "Cam"),
        (re(r"(?i)\b(?:telesync|hd-?ts)\b|\bTS\b"), "Telesync"),
        (re(r"(?i)\b(?:telecine|hd-?tc)\b|\bTC\b"), "Telecine"),
        (re(r"(?i)\bdvd-?scr\b"), "DVDSCR"),
        (re(r"(?i)\b(?:screener|scr)\b"), "Screener"),
        (re(r"(?i)\bworkprint\b"), "Workprint"),
        (re(r"(?i)\bbr-?rip\b"), "BRRip"),
        (re(r"(?i)\bbd-?rip\b"), "BDRip"),
        (re(r"(?i)\bdvd-?rip\b"), "DVD-Rip"),
        (re(r"(?i)\btv-?rip\b"), "TVRip"),
        (re(r"(?i)\bvod-?rip\b"), "VODRip"),
        (re(r"(?i)\b(?:ds|sat)-?rip\b"), "DSRip"),
        (re(r"(?i)\bhdtv-?rip\b"), "HDTVRip"),
        (re(r"(?i)\bhd-?rip\b"), "HDRip"),
        (re(r"(?i)\bppv(?:-?rip)?\b"), "Pay-Per-View Rip"),
        (re(r"(?i)\bweb-?rip\b"), "WEBRip"),
        (re(r"(?i)\bweb(?:-?dl)?\b"), "WEB-DL"),
        (re(r"(?i)\b(?:blu-?ray|bd-?remux)\b"), "Blu-ray"),
        (re(r"(?i)\bhdtv\b"), "HDTV"),
        (re(r"(?i)\bdvd-?r\b"), "DVD-R"),
    ]
});

static CODECS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:[xh]\.?265|hevc)\b"), "H.265"),
        (re(r"(?i)\b(?:[xh]\.?264|avc)\b"), "H.264"),
        (re(r"(?i)\bh\.?263\b"), "H.263"),
        (re(r"(?i)\bxvid\b"), "Xvid"),
        (re(r"(?i)\bdivx\b"), "DivX"),
        (re(r"(?i)\bav1\b"), "AV1"),
    ]
});

static AUDIO: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\bdual[ ._-]?audio\b"), "Dual"),
        (re(r"(?i)\btrue-?hd\b"), "Dolby TrueHD"),
        (re(r"(?i)\batmos\b"), "Dolby Atmos"),
        (re(r"(?i)\bdts-?hd(?:[ ._-]?ma)?\b"), "DTS-HD MA"),
        (re(r"(?i)\bdts-?x\b"), "DTS:X"),
        (re(r"(?i)\bdts\b"), "DTS"),
        (re(r"(?i)\b(?:ddp|dd\+|e-?ac-?3)[ ._]?7[ ._]?1"), "Dolby Digital Plus 7.1"),
        (re(r"(?i)\b(?:ddp|dd\+|e-?ac-?3)"), "Dolby Digital Plus 5.1"),
        (re(r"(?i)\b(?:dd|ac-?3)[ ._]?5[ ._]?1\b"), "Dolby Digital 5.1"),
        (re(r"(?i)\baac[ ._]?5[ ._]?1\b"), "AAC 5.1"),
        (re(r"(?i)\baac[ ._]?2[ ._]?0\b"), "AAC 2.0"),
        (re(r"(?i)\baac\b"), "AAC"),
        (re(r"(?i)\bflac\b"), "FLAC"),
    ]
});

static LANGUAGES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"(?i)\b(?:english|eng)\b"), "English"),
        (re(r"(?i)\b(?:french|truefrench|vff|vostfr)\b"), "French"),
        (re(r"(?i)\b(?:german|deutsch|ger)\b"), "German"),
        (re(r"(?i)\b(?:spanish|castellano|latino|spa)\b"), "Spanish"),
        (re(r"(?i)\b(?:italian|ita)\b"), "Italian"),
        (re(r"(?i)\b(?:russian|rus)\b"), "Russian"),
        (re(r"(?i)\b(?:japanese|jap)\b"), "Japanese"),
        (re(r"(?i)\b(?:korean|kor)\b"), "Korean"),
        (re(r"(?i)\bhindi\b"), "Hindi"),
        (re(r"(?i)\b(?:portuguese|por)\b"), "Portuguese"),
        (re(r"(?i)\bmulti\b"), "Multi"),
    ]
});

static NETWORKS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"\bATVP\b"), "Apple TV+"),
        (re(r"\bAMZN\b"), "Amazon Studios"),
        (re(r"\bNF\b"), "Netflix"),
        (re(r"\bDSNP\b"), "Disney Plus"),
        (re(r"\bHMAX\b"), "HBO Max"),
        (re(r"\bHULU\b"), "Hulu Networks"),
        (re(r"\bPCOK\b"), "Peacock"),
        (re(r"\bCR\b"), "Crunchyroll"),
    ]
});

static HDR: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(?:hdr(?:10)?(?:\+|plus)?|dolby[ ._]?vision|dovi)\b"));
static PROPER: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bproper\b"));
static REPACK: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(?:repack|rerip)\b"));
static REMUX: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bremux\b"));
static UPSCALED: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(?:upscaled?|ai[ ._]?upscale)\b"));
static EXTENDED: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bextended\b"));
static DUAL_AUDIO_HINT: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(?:dual.audio)|(?:english|eng)\W+(?:dub|audio)"));

fn first_label(table: &[(Regex, &'static str)], raw: &str) -> Option<(usize, &'static str)> {
    table
        .iter()
        .filter_map(|(regex, label)| regex.find(raw).map(|m| (m.start(), *label)))
        .next()
}

fn range(from: u32, to: u32) -> impl Iterator<Item = u32> {
    let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
    lo..=hi
}

/// Parse a release name
pub fn parse_release(raw: &str) -> ParsedRelease {
    let mut parsed = ParsedRelease::default();
    // Earliest position of anything that is not part of the title
    let mut title_end = raw.len();
    let mut mark = |pos: usize| title_end = title_end.min(pos);

    if let Some(m) = RESOLUTION.captures(raw).and_then(|c| c.get(1)) {
        mark(m.start());
        let resolution = match m.as_str().to_ascii_lowercase().as_str() {
            "4k" => "4K".to_string(),
            "uhd" => "UHD".to_string(),
            "1080i" => "1080p".to_string(),
            other => other.to_string(),
        };
        parsed.resolution = Some(resolution);
    }

    if let Some(m) = YEAR.captures_iter(raw).filter_map(|c| c.get(1)).find(|m| m.start() > 0) {
        mark(m.start());
        parsed.year = m.as_str().parse().ok();
    }

    if let Some(caps) = SEASON_EPISODE.captures(raw) {
        if let Some(whole) = caps.get(0) {
            mark(whole.start());
        }
        let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let first: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        if let (Some(season), Some(first)) = (season, first) {
            parsed.seasons.push(season);
            parsed.episodes.push(first);
            let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            for token in EPISODE_TOKEN.captures_iter(rest) {
                let Some(number) = token.get(2).and_then(|m| m.as_str().parse::<u32>().ok())
                else {
                    continue;
                };
                let last = parsed.episodes.last().copied().unwrap_or(number);
                if token.get(1).is_some() {
                    parsed.episodes.extend(range(last, number).filter(|e| *e != last));
                } else {
                    parsed.episodes.push(number);
                }
            }
        }
    } else if let Some(caps) = CROSS_EPISODE.captures(raw) {
        if let Some(whole) = caps.get(0) {
            mark(whole.start());
        }
        if let (Some(s), Some(e)) = (
            caps.get(1).and_then(|m| m.as_str().parse().ok()),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ) {
            parsed.seasons.push(s);
            parsed.episodes.push(e);
        }
    } else if let Some(caps) = SEASON_PACK.captures(raw).or_else(|| SEASON_WORD.captures(raw)) {
        if let Some(whole) = caps.get(0) {
            mark(whole.start());
        }
        let from: Option<u32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let to: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        match (from, to) {
            (Some(from), Some(to)) => parsed.seasons.extend(range(from, to)),
            (Some(from), None) => parsed.seasons.push(from),
            _ => {}
        }
    }
    parsed.episodes.sort_unstable();
    parsed.episodes.dedup();

    if let Some((pos, quality)) = first_label(&QUALITIES, raw) {
        mark(pos);
        parsed.quality = Some(quality.to_string());
    }
    if let Some((pos, codec)) = first_label(&CODECS, raw) {
        mark(pos);
        parsed.codec = Some(codec.to_string());
    }
    if let Some((_, audio)) = first_label(&AUDIO, raw) {
        parsed.audio = Some(audio.to_string());
    }
    if let Some((_, network)) = first_label(&NETWORKS, raw) {
        parsed.network = Some(network.to_string());
    }

    for (regex, language) in LANGUAGES.iter() {
        if regex.is_match(raw) {
            parsed.languages.push(language.to_string());
        }
    }
    if parsed.languages.iter().any(|l| l == "Multi") && !parsed.languages.iter().any(|l| l == "English") {
        parsed.languages.push("English".to_string());
    }
    if parsed.languages.is_empty() {
        parsed.languages.push("English".to_string());
    }

    parsed.hdr = HDR.is_match(raw);
    parsed.proper = PROPER.is_match(raw);
    parsed.repack = REPACK.is_match(raw);
    parsed.remux = REMUX.is_match(raw);
    parsed.upscaled = UPSCALED.is_match(raw);
    parsed.extended = EXTENDED.is_match(raw);
    parsed.dual_audio = parsed.audio.as_deref() == Some("Dual") || DUAL_AUDIO_HINT.is_match(raw);

    parsed.title = clean_title(&raw[..title_end]);
    parsed
}

fn clean_title(fragment: &str) -> String {
    let without_tag = BRACKET_TAG.replace(fragment, "");
    without_tag
        .replace(['.', '_'], " ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '(' | '[' | '{'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case, alphanumerics only, single spaces
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a release name is about the expected title
pub fn title_matches(expected: &str, raw: &str) -> bool {
    let expected = normalize(expected);
    let parsed = normalize(&parse_release(raw).title);
    if expected.is_empty() || parsed.is_empty() {
        return false;
    }
    parsed.starts_with(&expected) || strsim::normalized_levenshtein(&expected, &parsed) >= 0.85
}

/// Settings-aware release filter and ranking
#[derive(Debug, Clone)]
pub struct ReleaseParser {
    settings: ParserSettings,
    resolutions: Vec<&'static str>,
    audio: Vec<&'static str>,
    unwanted_codec: Vec<&'static str>,
}

const UNWANTED_QUALITY: &[&str] = &[
    "Cam",
    "Telesync",
    "Telecine",
    "Screener",
    "DVDSCR",
    "Workprint",
    "DVD-Rip",
    "TVRip",
    "VODRip",
    "DVD-R",
    "DSRip",
    "BRRip",
];

const HIGH_QUALITY_AUDIO: &[&str] = &[
    "Dolby TrueHD",
    "Dolby Atmos",
    "Dolby Digital Plus 5.1",
    "Dolby Digital Plus 7.1",
    "Dolby Digital 5.1",
    "DTS-HD MA",
    "DTS:X",
    "DTS",
];

impl ReleaseParser {
    pub fn new(settings: &ParserSettings) -> Self {
        let resolutions = if settings.highest_quality {
            vec!["UHD", "2160p", "4K", "1080p", "720p"]
        } else if settings.include_4k {
            vec!["2160p", "4K", "1080p", "720p"]
        } else {
            vec!["1080p", "720p"]
        };

        let mut audio = vec!["AAC", "AAC 2.0", "AAC 5.1", "FLAC"];
        if settings.highest_quality {
            audio.extend_from_slice(HIGH_QUALITY_AUDIO);
        }
        if settings.dual_audio {
            audio.push("Dual");
        }

        let mut unwanted_codec = vec!["H.263", "Xvid"];
        if !settings.av1_audio {
            unwanted_codec.push("AV1");
        }

        Self {
            settings: settings.clone(),
            resolutions,
            audio,
            unwanted_codec,
        }
    }

    /// Whether a release satisfies the configured constraints
    pub fn accepts(&self, raw: &str) -> bool {
        let parsed = parse_release(raw);
        self.accepts_parsed(&parsed)
    }

    fn accepts_parsed(&self, parsed: &ParsedRelease) -> bool {
        let resolution_ok = parsed
            .resolution
            .as_deref()
            .map(|r| self.resolutions.contains(&r))
            .unwrap_or(false);
        let language_ok = parsed
            .languages
            .iter()
            .any(|l| self.settings.language.iter().any(|wanted| wanted.eq_ignore_ascii_case(l)));
        let audio_ok = parsed
            .audio
            .as_deref()
            .map(|a| self.audio.contains(&a))
            .unwrap_or(true);
        let quality_ok = !parsed
            .quality
            .as_deref()
            .map(|q| UNWANTED_QUALITY.contains(&q))
            .unwrap_or(false);
        let codec_ok = !parsed
            .codec
            .as_deref()
            .map(|c| self.unwanted_codec.contains(&c))
            .unwrap_or(false);

        resolution_ok && language_ok && audio_ok && quality_ok && codec_ok
    }

    /// Preference tuple; larger sorts first
    pub fn sort_key(&self, raw: &str) -> (bool, bool, bool, bool, bool) {
        let parsed = parse_release(raw);
        self.sort_key_parsed(&parsed)
    }

    fn sort_key_parsed(&self, parsed: &ParsedRelease) -> (bool, bool, bool, bool, bool) {
        let resolution = parsed.resolution.as_deref().unwrap_or("");
        let dual = self.settings.dual_audio && parsed.dual_audio;
        let repack = self.settings.repack_proper && (parsed.proper || parsed.repack);
        let highest = self.settings.highest_quality
            && (parsed.hdr
                || parsed.remux
                || parsed.upscaled
                || matches!(resolution, "UHD" | "2160p" | "4K")
                || parsed
                    .audio
                    .as_deref()
                    .map(|a| HIGH_QUALITY_AUDIO.contains(&a))
                    .unwrap_or(false));
        let is_4k = self.settings.include_4k && matches!(resolution, "2160p" | "4K");
        let network = parsed.network.is_some();
        (dual, repack, highest, is_4k, network)
    }

    /// Drop unacceptable streams, order the rest and assign ranks
    ///
    /// Ties keep their incoming order. The best stream gets the highest rank.
    pub fn rank_streams(&self, streams: Vec<Stream>) -> Vec<Stream> {
        let mut keyed: Vec<_> = streams
            .into_iter()
            .filter_map(|stream| {
                let parsed = parse_release(&stream.raw_title);
                self.accepts_parsed(&parsed)
                    .then(|| (self.sort_key_parsed(&parsed), stream))
            })
            .collect();
        keyed.sort_by_key(|(key, _)| Reverse(*key));

        let total = keyed.len() as i64;
        keyed
            .into_iter()
            .enumerate()
            .map(|(i, (_, mut stream))| {
                stream.rank = total - i as i64;
                stream
            })
            .collect()
    }

    /// Episodes a release covers
    pub fn episodes(&self, raw: &str) -> Vec<u32> {
        parse_release(raw).episodes
    }

    /// Episodes a release covers for the given season
    pub fn episodes_in_season(&self, season: u32, raw: &str) -> Vec<u32> {
        let parsed = parse_release(raw);
        if parsed.seasons.first() == Some(&season) {
            parsed.episodes
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_parser() -> ReleaseParser {
        ReleaseParser::new(&ParserSettings::default())
    }

    // ========================================
    // Parsing
    // ========================================

    #[test]
    fn test_parse_movie_release() {
        let parsed = parse_release("The.Matrix.1999.1080p.BluRay.x264-GROUP");
        assert_eq!(parsed.title, "The Matrix");
        assert_eq!(parsed.year, Some(1999));
        assert_eq!(parsed.resolution.as_deref(), Some("1080p"));
        assert_eq!(parsed.quality.as_deref(), Some("Blu-ray"));
        assert_eq!(parsed.codec.as_deref(), Some("H.264"));
        assert!(parsed.episodes.is_empty());
        assert_eq!(parsed.languages, vec!["English".to_string()]);
    }

    #[test]
    fn test_parse_leading_year_is_title() {
        let parsed = parse_release("2001.A.Space.Odyssey.1968.720p.WEB-DL");
        assert_eq!(parsed.year, Some(1968));
        assert_eq!(parsed.title, "2001 A Space Odyssey");
    }

    #[test]
    fn test_parse_single_episode() {
        let parsed = parse_release("Show.Name.S02E05.720p.HDTV.x264");
        assert_eq!(parsed.title, "Show Name");
        assert_eq!(parsed.seasons, vec![2]);
        assert_eq!(parsed.episodes, vec![5]);
        assert_eq!(parsed.quality.as_deref(), Some("HDTV"));
    }

    #[test]
    fn test_parse_multi_episode_forms() {
        assert_eq!(parse_release("Show.S01E01E02.1080p").episodes, vec![1, 2]);
        assert_eq!(parse_release("Show.S01E01-E03.1080p").episodes, vec![1, 2, 3]);
        assert_eq!(parse_release("Show S01E04-06 1080p").episodes, vec![4, 5, 6]);
        assert_eq!(parse_release("Show.1x07.720p").episodes, vec![7]);
    }

    #[test]
    fn test_parse_season_packs() {
        let pack = parse_release("Show.Name.S03.1080p.WEB-DL");
        assert_eq!(pack.seasons, vec![3]);
        assert!(pack.episodes.is_empty());

        let range = parse_release("Show.Name.S01-S03.1080p.BluRay");
        assert_eq!(range.seasons, vec![1, 2, 3]);

        let words = parse_release("Show Name Season 2 Complete 720p");
        assert_eq!(words.seasons, vec![2]);
        assert_eq!(words.title, "Show Name");
    }

    #[test]
    fn test_parse_flags() {
        let parsed =
            parse_release("Movie.2020.2160p.UHD.BluRay.REMUX.HDR.TrueHD.Atmos.PROPER-GRP");
        assert_eq!(parsed.resolution.as_deref(), Some("2160p"));
        assert!(parsed.remux);
        assert!(parsed.hdr);
        assert!(parsed.proper);
        assert_eq!(parsed.audio.as_deref(), Some("Dolby TrueHD"));
    }

    #[test]
    fn test_parse_network_and_languages() {
        let parsed = parse_release("Show.S01E01.1080p.AMZN.WEB-DL.MULTI");
        assert_eq!(parsed.network.as_deref(), Some("Amazon Studios"));
        assert!(parsed.languages.contains(&"English".to_string()));

        let french = parse_release("Film.2019.1080p.WEB.FRENCH");
        assert_eq!(french.languages, vec!["French".to_string()]);
    }

    // ========================================
    // Filtering
    // ========================================

    #[test]
    fn test_default_filter() {
        let parser = default_parser();
        assert!(parser.accepts("The.Matrix.1999.1080p.BluRay.x264"));
        assert!(parser.accepts("The.Matrix.1999.720p.WEB-DL.AAC"));
        assert!(!parser.accepts("The.Matrix.1999.2160p.BluRay.x265"));
        assert!(!parser.accepts("The.Matrix.1999.480p.DVDRip"));
        assert!(!parser.accepts("The.Matrix.1999.1080p.CAM"));
        assert!(!parser.accepts("The.Matrix.1999.1080p.WEB.XviD"));
        assert!(!parser.accepts("The.Matrix.1999.1080p.WEB.AV1"));
        assert!(!parser.accepts("The.Matrix.1999.1080p.WEB.FRENCH"));
        assert!(!parser.accepts("The.Matrix.1999.BluRay"));
    }

    #[test]
    fn test_include_4k_and_av1() {
        let parser = ReleaseParser::new(&ParserSettings {
            include_4k: true,
            av1_audio: true,
            ..Default::default()
        });
        assert!(parser.accepts("Movie.2020.2160p.WEB-DL.AV1"));
        assert!(!parser.accepts("Movie.2020.UHD.WEB-DL"));
    }

    #[test]
    fn test_highest_quality_allows_lossless_audio() {
        let default = default_parser();
        let highest = ReleaseParser::new(&ParserSettings {
            highest_quality: true,
            ..Default::default()
        });
        let raw = "Movie.2020.2160p.BluRay.REMUX.TrueHD";
        assert!(!default.accepts(raw));
        assert!(highest.accepts(raw));
    }

    // ========================================
    // Ranking
    // ========================================

    #[test]
    fn test_rank_prefers_repack_and_drops_rejects() {
        let parser = default_parser();
        let ranked = parser.rank_streams(vec![
            Stream::new("aaa", "Movie.2020.1080p.WEB-DL"),
            Stream::new("bbb", "Movie.2020.1080p.CAM"),
            Stream::new("ccc", "Movie.2020.1080p.REPACK.WEB-DL"),
            Stream::new("ddd", "Movie.2020.720p.BluRay"),
        ]);

        let hashes: Vec<_> = ranked.iter().map(|s| s.infohash.as_str()).collect();
        assert_eq!(hashes, vec!["ccc", "aaa", "ddd"]);
        assert_eq!(ranked[0].rank, 3);
        assert_eq!(ranked[2].rank, 1);
    }

    #[test]
    fn test_episodes_in_season() {
        let parser = default_parser();
        assert_eq!(parser.episodes_in_season(1, "Show.S01E02E03.1080p.mkv"), vec![2, 3]);
        assert!(parser.episodes_in_season(2, "Show.S01E02.1080p.mkv").is_empty());
        assert_eq!(parser.episodes("Show.S05E10.mkv"), vec![10]);
    }

    #[test]
    fn test_title_matches() {
        assert!(title_matches("The Matrix", "The.Matrix.1999.1080p.BluRay"));
        assert!(title_matches("Spider-Man: No Way Home", "Spider.Man.No.Way.Home.2021.1080p"));
        assert!(!title_matches("The Matrix", "Inception.2010.1080p.BluRay"));
    }
}
