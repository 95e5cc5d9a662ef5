//! Excitement ratings for cyclocross races.
//!
//! The crate turns an ordered list of finisher gaps into a 1-5 star
//! [`RatingResult`], keeps the [`RaceCatalog`] of races worth rating, and
//! reconciles fresh ratings with a persisted [`Dataset`] through [`merge`]
//! without clobbering entries a human has flagged as manual.
//!
//! Nothing in here performs I/O. Fetching result pages and writing the
//! dataset belong to the callers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Cell values result tables use for "same time as the winner".
const SAME_TIME_MARKERS: [&str; 7] = ["", "-", "s.t.", "st", "\"\"", ",,", "0"];

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RatingError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Merge identity of a race. Field order doubles as the dataset sort order.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RaceKey {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub venue: String,
    pub category: String,
}

impl Display for RaceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let date = format_iso_date(self.date).map_err(|_| std::fmt::Error)?;
        write!(f, "{date}/{}/{}", self.venue, self.category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RaceDescriptor {
    pub id: u64,
    pub series: String,
    pub venue: String,
    pub country: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub category: String,
}

impl RaceDescriptor {
    #[must_use]
    pub fn key(&self) -> RaceKey {
        RaceKey {
            date: self.date,
            venue: self.venue.clone(),
            category: self.category.clone(),
        }
    }

    /// Checks required fields and normalizes country and category labels.
    ///
    /// # Errors
    /// Returns [`RatingError::Validation`] when a required text field is
    /// blank or the country is not a three-letter code.
    pub fn normalized(mut self) -> Result<Self, RatingError> {
        for (name, value) in [
            ("series", &self.series),
            ("venue", &self.venue),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(RatingError::Validation(format!(
                    "race {}: {name} MUST be provided",
                    self.id
                )));
            }
        }

        self.country = normalize_country(&self.country).ok_or_else(|| {
            RatingError::Validation(format!(
                "race {}: country MUST be a three-letter code, got {:?}",
                self.id, self.country
            ))
        })?;
        self.category = normalize_category(&self.category);
        self.series = self.series.trim().to_string();
        self.venue = self.venue.trim().to_string();
        Ok(self)
    }
}

/// Spelled in the same camelCase as the persisted entry fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingResult {
    pub stars: u8,
    #[serde(rename = "gapTo2nd")]
    pub gap_to_2nd: Option<i64>,
    #[serde(rename = "gapTo3rd")]
    pub gap_to_3rd: Option<i64>,
    #[serde(rename = "within10s")]
    pub within_10s: u32,
    pub finishers: u32,
    pub provisional: bool,
}

impl RatingResult {
    /// Sentinel for a race without any timing data yet.
    #[must_use]
    pub fn no_data() -> Self {
        Self {
            stars: 0,
            gap_to_2nd: None,
            gap_to_3rd: None,
            within_10s: 0,
            finishers: 0,
            provisional: false,
        }
    }

    #[must_use]
    pub fn is_no_data(&self) -> bool {
        self.stars == 0
    }
}

/// Thresholds driving star assignment.
///
/// Only the gap to second place decides the star count. The third-place gap
/// and the close-finish count are recorded next to it so that a rating can
/// always be explained by a single number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RatingPolicy {
    pub policy_version: u32,
    /// Exclusive upper bounds on the gap to 2nd for 5, 4, 3 and 2 stars.
    pub star_thresholds_secs: [i64; 4],
    pub close_window_secs: i64,
    pub provisional_min_finishers: u32,
}

impl Default for RatingPolicy {
    fn default() -> Self {
        Self::v1()
    }
}

impl RatingPolicy {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            policy_version: 1,
            star_thresholds_secs: [3, 10, 30, 60],
            close_window_secs: 10,
            provisional_min_finishers: 5,
        }
    }

    /// Validates threshold ordering and bounds.
    ///
    /// # Errors
    /// Returns [`RatingError::Configuration`] when one or more policy fields
    /// are outside allowed bounds.
    pub fn validate(&self) -> Result<(), RatingError> {
        if self.policy_version == 0 {
            return Err(RatingError::Configuration(
                "policy_version MUST be >= 1".to_string(),
            ));
        }

        if self.star_thresholds_secs[0] <= 0 {
            return Err(RatingError::Configuration(
                "star_thresholds_secs MUST be positive".to_string(),
            ));
        }

        if self
            .star_thresholds_secs
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(RatingError::Configuration(
                "star_thresholds_secs MUST be strictly ascending".to_string(),
            ));
        }

        if self.close_window_secs < 0 {
            return Err(RatingError::Configuration(
                "close_window_secs MUST be >= 0".to_string(),
            ));
        }

        if self.provisional_min_finishers == 0 {
            return Err(RatingError::Configuration(
                "provisional_min_finishers MUST be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a policy from JSON.
    ///
    /// # Errors
    /// Returns [`RatingError::Configuration`] when JSON decoding fails
    /// or decoded values violate policy constraints.
    pub fn from_json(value: &Value) -> Result<Self, RatingError> {
        let policy: Self = serde_json::from_value(value.clone()).map_err(|err| {
            RatingError::Configuration(format!("invalid rating policy JSON payload: {err}"))
        })?;
        policy.validate()?;
        Ok(policy)
    }

    #[must_use]
    pub fn stars_for(&self, gap_to_2nd: Option<i64>) -> u8 {
        let Some(gap) = gap_to_2nd else {
            return 1;
        };

        self.star_thresholds_secs
            .iter()
            .zip([5_u8, 4, 3, 2])
            .find(|(threshold, _)| gap < **threshold)
            .map_or(1, |(_, stars)| stars)
    }
}

/// Rates a race from its finisher gaps under [`RatingPolicy::v1`].
///
/// # Errors
/// Returns [`RatingError::MalformedInput`] for negative or decreasing gaps.
pub fn rate(gaps: &[i64]) -> Result<RatingResult, RatingError> {
    rate_with_policy(gaps, &RatingPolicy::v1())
}

/// Rates a race from gaps ordered by finishing position.
///
/// An empty list is not an error: it yields the 0-star "no data" sentinel.
///
/// # Errors
/// Returns [`RatingError::MalformedInput`] for negative or decreasing gaps.
pub fn rate_with_policy(gaps: &[i64], policy: &RatingPolicy) -> Result<RatingResult, RatingError> {
    validate_gaps(gaps)?;

    let Some(&winner) = gaps.first() else {
        return Ok(RatingResult::no_data());
    };

    let gap_to_2nd = gaps.get(1).map(|gap| gap - winner);
    let gap_to_3rd = gaps.get(2).map(|gap| gap - winner);
    let within_10s = gaps
        .iter()
        .filter(|gap| **gap - winner <= policy.close_window_secs)
        .count();
    let finishers = u32::try_from(gaps.len()).unwrap_or(u32::MAX);

    Ok(RatingResult {
        stars: policy.stars_for(gap_to_2nd),
        gap_to_2nd,
        gap_to_3rd,
        within_10s: u32::try_from(within_10s).unwrap_or(u32::MAX),
        finishers,
        provisional: finishers < policy.provisional_min_finishers,
    })
}

fn validate_gaps(gaps: &[i64]) -> Result<(), RatingError> {
    if let Some((position, gap)) = gaps.iter().enumerate().find(|(_, gap)| **gap < 0) {
        return Err(RatingError::MalformedInput(format!(
            "gap at position {} is negative ({gap}s)",
            position + 1
        )));
    }

    if let Some((position, pair)) = gaps
        .windows(2)
        .enumerate()
        .find(|(_, pair)| pair[1] < pair[0])
    {
        return Err(RatingError::MalformedInput(format!(
            "gaps MUST be non-decreasing: position {} ({}s) follows {}s",
            position + 2,
            pair[1],
            pair[0]
        )));
    }

    Ok(())
}

/// Parses a result-table gap cell into seconds.
///
/// Accepts same-time markers (`s.t.`, `-`, ...), bare seconds, `m:ss` and
/// `h:mm:ss`, each optionally prefixed with `+`.
///
/// # Errors
/// Returns [`RatingError::MalformedInput`] when the cell is not a gap.
pub fn parse_gap(raw: &str) -> Result<i64, RatingError> {
    let trimmed = raw.trim();
    if SAME_TIME_MARKERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(0);
    }

    let body = trimmed.trim_start_matches('+').trim();
    let malformed = || RatingError::MalformedInput(format!("unrecognized gap value {raw:?}"));
    let parts = body
        .split(':')
        .map(parse_gap_component)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(malformed)?;

    match parts.as_slice() {
        [seconds] => Ok(*seconds),
        [minutes, seconds] if *seconds < 60 => Ok(minutes * 60 + seconds),
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            Ok(hours * 3_600 + minutes * 60 + seconds)
        }
        _ => Err(malformed()),
    }
}

fn parse_gap_component(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().map(i64::from)
}

/// A gap as handed over by the extractor: seconds or the raw cell text.
///
/// Any other JSON value decodes as `Other` so that one bad cell only rejects
/// its own race when the gaps are converted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum GapValue {
    Seconds(i64),
    Text(String),
    Other(Value),
}

impl GapValue {
    /// # Errors
    /// Returns [`RatingError::MalformedInput`] when text does not parse or
    /// the value is neither whole seconds nor text.
    pub fn to_seconds(&self) -> Result<i64, RatingError> {
        match self {
            Self::Seconds(value) => Ok(*value),
            Self::Text(raw) => parse_gap(raw),
            Self::Other(value) => Err(RatingError::MalformedInput(format!(
                "gap {value} is not whole seconds or gap text"
            ))),
        }
    }
}

/// Where the gaps for one race come from during a run.
///
/// `Ok(None)` means nothing was supplied for the race this run, which keeps
/// its persisted entry untouched. `Ok(Some(vec![]))` means the source was
/// reached but listed no finishers.
pub trait GapSource {
    /// # Errors
    /// Returns [`RatingError::MalformedInput`] when the supplied data for
    /// this race cannot be turned into gaps.
    fn gaps_for(&self, race: &RaceDescriptor) -> Result<Option<Vec<i64>>, RatingError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GapFileRace {
    pub id: u64,
    pub gaps: Vec<GapValue>,
}

/// Gap lists keyed by source race id, as written by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GapFile {
    pub races: Vec<GapFileRace>,
}

impl GapFile {
    /// # Errors
    /// Returns [`RatingError::Validation`] on invalid JSON or when a race id
    /// appears twice.
    pub fn from_json_str(raw: &str) -> Result<Self, RatingError> {
        let file: Self = serde_json::from_str(raw)
            .map_err(|err| RatingError::Validation(format!("invalid gap file: {err}")))?;

        let mut seen = BTreeSet::new();
        for race in &file.races {
            if !seen.insert(race.id) {
                return Err(RatingError::Validation(format!(
                    "gap file lists race {} more than once",
                    race.id
                )));
            }
        }

        Ok(file)
    }
}

impl GapSource for GapFile {
    fn gaps_for(&self, race: &RaceDescriptor) -> Result<Option<Vec<i64>>, RatingError> {
        let Some(entry) = self.races.iter().find(|entry| entry.id == race.id) else {
            return Ok(None);
        };

        entry
            .gaps
            .iter()
            .map(GapValue::to_seconds)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Append-only registry of races worth rating.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RaceCatalog {
    races: Vec<RaceDescriptor>,
}

impl RaceCatalog {
    /// Builds a catalog, normalizing labels and rejecting duplicates.
    ///
    /// # Errors
    /// Returns [`RatingError::Validation`] when a race is invalid or shares
    /// its source id or `(date, venue, category)` key with an earlier race.
    pub fn from_races(races: Vec<RaceDescriptor>) -> Result<Self, RatingError> {
        let mut ids = BTreeSet::new();
        let mut keys = BTreeSet::new();
        let mut normalized = Vec::with_capacity(races.len());

        for race in races {
            let race = race.normalized()?;
            if !ids.insert(race.id) {
                return Err(RatingError::Validation(format!(
                    "catalog lists race id {} more than once",
                    race.id
                )));
            }
            let key = race.key();
            if !keys.insert(key.clone()) {
                return Err(RatingError::Validation(format!(
                    "catalog lists race {key} more than once"
                )));
            }
            normalized.push(race);
        }

        Ok(Self { races: normalized })
    }

    /// Decodes a JSON array of race records.
    ///
    /// # Errors
    /// Returns [`RatingError::Validation`] when decoding or validation fails.
    pub fn from_json_str(raw: &str) -> Result<Self, RatingError> {
        let races: Vec<RaceDescriptor> = serde_json::from_str(raw)
            .map_err(|err| RatingError::Validation(format!("invalid catalog JSON: {err}")))?;
        Self::from_races(races)
    }

    #[must_use]
    pub fn races(&self) -> &[RaceDescriptor] {
        &self.races
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&RaceDescriptor> {
        self.races.iter().find(|race| race.id == id)
    }

    /// Races held on or before `as_of`, in registry order.
    #[must_use]
    pub fn list_targets(&self, as_of: Date) -> Vec<&RaceDescriptor> {
        self.races.iter().filter(|race| race.date <= as_of).collect()
    }
}

#[must_use]
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "men elite" | "elite men" => "Elite Men".to_string(),
        "women elite" | "elite women" => "Elite Women".to_string(),
        _ => trimmed.to_string(),
    }
}

fn normalize_country(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 3 && trimmed.bytes().all(|byte| byte.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

/// One persisted race rating, in the shape consumers read.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoredRaceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub venue: String,
    pub country: String,
    pub series: String,
    pub category: String,
    pub stars: u8,
    #[serde(rename = "gapTo2nd")]
    pub gap_to_2nd: Option<i64>,
    #[serde(rename = "gapTo3rd")]
    pub gap_to_3rd: Option<i64>,
    #[serde(rename = "within10s")]
    pub within_10s: u32,
    #[serde(default)]
    pub provisional: bool,
    #[serde(rename = "isManual")]
    pub is_manual: bool,
}

impl StoredRaceEntry {
    #[must_use]
    pub fn from_rated(race: &RaceDescriptor, rating: &RatingResult) -> Self {
        let mut entry = Self {
            id: None,
            date: race.date,
            venue: String::new(),
            country: String::new(),
            series: String::new(),
            category: String::new(),
            stars: 0,
            gap_to_2nd: None,
            gap_to_3rd: None,
            within_10s: 0,
            provisional: false,
            is_manual: false,
        };
        entry.overwrite(race, rating);
        entry
    }

    #[must_use]
    pub fn key(&self) -> RaceKey {
        RaceKey {
            date: self.date,
            venue: self.venue.clone(),
            category: self.category.clone(),
        }
    }

    /// Validates a persisted entry.
    ///
    /// # Errors
    /// Returns [`RatingError::Validation`] when identity fields are blank,
    /// the star count is out of range, or the gaps are inconsistent.
    pub fn validate(&self) -> Result<(), RatingError> {
        let key = self.key();
        if self.venue.trim().is_empty() || self.category.trim().is_empty() {
            return Err(RatingError::Validation(format!(
                "entry {key}: venue and category MUST be provided"
            )));
        }

        if self.stars > 5 {
            return Err(RatingError::Validation(format!(
                "entry {key}: stars MUST be in [0, 5], got {}",
                self.stars
            )));
        }

        for (name, gap) in [("gapTo2nd", self.gap_to_2nd), ("gapTo3rd", self.gap_to_3rd)] {
            if gap.is_some_and(|value| value < 0) {
                return Err(RatingError::Validation(format!(
                    "entry {key}: {name} MUST be >= 0"
                )));
            }
        }

        if let (Some(second), Some(third)) = (self.gap_to_2nd, self.gap_to_3rd) {
            if third < second {
                return Err(RatingError::Validation(format!(
                    "entry {key}: gapTo3rd MUST be >= gapTo2nd"
                )));
            }
        }

        Ok(())
    }

    fn overwrite(&mut self, race: &RaceDescriptor, rating: &RatingResult) {
        self.id = Some(race.id);
        self.date = race.date;
        self.venue.clone_from(&race.venue);
        self.country.clone_from(&race.country);
        self.series.clone_from(&race.series);
        self.category.clone_from(&race.category);
        self.stars = rating.stars;
        self.gap_to_2nd = rating.gap_to_2nd;
        self.gap_to_3rd = rating.gap_to_3rd;
        self.within_10s = rating.within_10s;
        self.provisional = rating.provisional;
        self.is_manual = false;
    }
}

/// Persisted ratings keyed by `(date, venue, category)`, always kept in
/// date, venue, category order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Dataset {
    entries: BTreeMap<RaceKey, StoredRaceEntry>,
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dataset from decoded entries.
    ///
    /// # Errors
    /// Returns [`RatingError::Validation`] when an entry is invalid or two
    /// entries share a key.
    pub fn from_entries(entries: Vec<StoredRaceEntry>) -> Result<Self, RatingError> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let key = entry.key();
            if map.contains_key(&key) {
                return Err(RatingError::Validation(format!(
                    "dataset contains {key} more than once"
                )));
            }
            map.insert(key, entry);
        }
        Ok(Self { entries: map })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &RaceKey) -> Option<&StoredRaceEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &StoredRaceEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<StoredRaceEntry> {
        self.entries.into_values().collect()
    }
}

/// On-disk shape of the dataset read by the static page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatasetDocument {
    #[serde(rename = "lastUpdated", default, with = "iso_date::option")]
    pub last_updated: Option<Date>,
    pub races: Vec<StoredRaceEntry>,
}

impl DatasetDocument {
    #[must_use]
    pub fn from_dataset(dataset: &Dataset, last_updated: Date) -> Self {
        Self {
            last_updated: Some(last_updated),
            races: dataset.entries().cloned().collect(),
        }
    }

    /// # Errors
    /// Returns [`RatingError::Validation`] when a record is invalid or two
    /// records share a `(date, venue, category)` key.
    pub fn into_dataset(self) -> Result<Dataset, RatingError> {
        Dataset::from_entries(self.races)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub manual_preserved: usize,
    pub carried_forward: usize,
}

/// Combines fresh ratings with the persisted dataset.
///
/// Manual entries are never touched. Every other matching entry takes the
/// incoming values, including a 0-star "no data" rating. Entries without
/// incoming data are carried forward as they are.
#[must_use]
pub fn merge(existing: &Dataset, incoming: &[(RaceDescriptor, RatingResult)]) -> Dataset {
    merge_with_summary(existing, incoming).0
}

#[must_use]
pub fn merge_with_summary(
    existing: &Dataset,
    incoming: &[(RaceDescriptor, RatingResult)],
) -> (Dataset, MergeSummary) {
    let mut merged = existing.entries.clone();
    let mut touched = BTreeSet::new();
    let mut summary = MergeSummary::default();

    for (race, rating) in incoming {
        let key = race.key();
        match merged.get_mut(&key) {
            None => {
                tracing::debug!(race = %key, stars = rating.stars, "inserting new entry");
                merged.insert(key.clone(), StoredRaceEntry::from_rated(race, rating));
                summary.inserted += 1;
            }
            Some(entry) if entry.is_manual => {
                tracing::debug!(race = %key, "keeping manual entry");
                summary.manual_preserved += 1;
            }
            Some(entry) => {
                if rating.is_no_data() && entry.stars > 0 {
                    tracing::warn!(
                        race = %key,
                        previous_stars = entry.stars,
                        "fresh data has no finishers; overwriting previous rating"
                    );
                }
                entry.overwrite(race, rating);
                summary.updated += 1;
            }
        }
        touched.insert(key);
    }

    summary.carried_forward = merged.keys().filter(|key| !touched.contains(*key)).count();
    (Dataset { entries: merged }, summary)
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RaceStatus {
    Rated { stars: u8, provisional: bool },
    Missing,
    Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RaceOutcome {
    pub id: u64,
    pub key: String,
    #[serde(flatten)]
    pub status: RaceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoredBatch {
    pub incoming: Vec<(RaceDescriptor, RatingResult)>,
    pub outcomes: Vec<RaceOutcome>,
}

impl ScoredBatch {
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&RaceStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

/// Rates every target with whatever gaps the source supplies.
///
/// A race whose gaps are missing or malformed produces no incoming pair,
/// so its persisted entry is carried forward by [`merge`].
pub fn score_targets(
    targets: &[&RaceDescriptor],
    source: &dyn GapSource,
    policy: &RatingPolicy,
) -> ScoredBatch {
    let mut batch = ScoredBatch::default();

    for race in targets {
        let key = race.key();
        let status = match source
            .gaps_for(race)
            .and_then(|gaps| gaps.map(|gaps| rate_with_policy(&gaps, policy)).transpose())
        {
            Ok(Some(rating)) => {
                tracing::info!(
                    race = %key,
                    id = race.id,
                    stars = rating.stars,
                    provisional = rating.provisional,
                    "rated race"
                );
                batch.incoming.push(((*race).clone(), rating));
                RaceStatus::Rated {
                    stars: rating.stars,
                    provisional: rating.provisional,
                }
            }
            Ok(None) => {
                tracing::info!(race = %key, id = race.id, "no gap data supplied");
                RaceStatus::Missing
            }
            Err(err) => {
                tracing::warn!(race = %key, id = race.id, error = %err, "rejected race data");
                RaceStatus::Rejected {
                    reason: err.to_string(),
                }
            }
        };

        batch.outcomes.push(RaceOutcome {
            id: race.id,
            key: key.to_string(),
            status,
        });
    }

    batch
}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
///
/// # Errors
/// Returns [`RatingError::Validation`] when parsing fails.
pub fn parse_iso_date(value: &str) -> Result<Date, RatingError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| RatingError::Validation(format!("invalid ISO-8601 date {value:?}: {err}")))
}

/// Formats a date as `YYYY-MM-DD`.
///
/// # Errors
/// Returns [`RatingError::Validation`] when formatting fails.
pub fn format_iso_date(value: Date) -> Result<String, RatingError> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| RatingError::Validation(format!("failed to format date: {err}")))
}

#[must_use]
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}
