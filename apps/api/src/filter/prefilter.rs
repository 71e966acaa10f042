//! Regex Pre-Filter: deterministic, in-process rejection of obvious
//! non-matches before any classifier call is paid for.
//!
//! Title rules reject; location only classifies (foreign jobs stay in the
//! pipeline with low priority); the intern flag is carried, never rejects.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::models::job::JobListing;

lazy_static! {
    static ref SENIORITY: Regex = Regex::new(
        r"(?i)\b(senior|sr|staff|principal|lead|manager|director|vp|vice president|chief|head of)\b"
    )
    .unwrap();

    static ref NON_ENGINEERING: Regex = Regex::new(
        r"(?i)\b(sales|marketing|account executive|customer success|recruiter|recruiting|talent|pm|product manager|program manager|analyst|designer|design|finance|accounting|legal|hr|human resources)\b"
    )
    .unwrap();

    static ref INTERN_MARKER: Regex =
        Regex::new(r"(?i)\b(intern|interns|internship|co-op|coop)\b").unwrap();

    static ref NEW_GRAD_QUALIFIER: Regex = Regex::new(
        r"(?i)\b(new grad|new graduate|entry[- ]level|junior|jr|associate)\b"
    )
    .unwrap();

    static ref US_COUNTRY: Regex =
        Regex::new(r"(?i)(\bu\.s\.a?\.?|\b(us|usa|united states)\b)").unwrap();

    static ref US_STATE_NAME: Regex = Regex::new(
        r"(?i)\b(alabama|alaska|arizona|arkansas|california|colorado|connecticut|delaware|florida|georgia|hawaii|idaho|illinois|indiana|iowa|kansas|kentucky|louisiana|maine|maryland|massachusetts|michigan|minnesota|mississippi|missouri|montana|nebraska|nevada|new hampshire|new jersey|new mexico|new york|north carolina|north dakota|ohio|oklahoma|oregon|pennsylvania|rhode island|south carolina|south dakota|tennessee|texas|utah|vermont|virginia|washington|west virginia|wisconsin|wyoming|district of columbia)\b"
    )
    .unwrap();

    static ref US_CITY: Regex = Regex::new(
        r"(?i)\b(san francisco|sf bay area|bay area|silicon valley|palo alto|mountain view|menlo park|sunnyvale|san jose|oakland|berkeley|los angeles|san diego|seattle|bellevue|redmond|portland|austin|dallas|houston|denver|boulder|chicago|boston|cambridge, ma|nyc|brooklyn|manhattan|philadelphia|pittsburgh|atlanta|miami|raleigh|durham|salt lake city|phoenix|minneapolis|detroit|nashville)\b"
    )
    .unwrap();

    // Case-sensitive: two-letter postal codes only count in "City, ST" form.
    static ref US_STATE_ABBREV: Regex = Regex::new(
        r",\s*(AL|AK|AZ|AR|CA|CO|CT|DE|FL|GA|HI|ID|IL|IN|IA|KS|KY|LA|ME|MD|MA|MI|MN|MS|MO|MT|NE|NV|NH|NJ|NM|NY|NC|ND|OH|OK|OR|PA|RI|SC|SD|TN|TX|UT|VT|VA|WA|WV|WI|WY|DC)\b"
    )
    .unwrap();

    static ref FOREIGN_PLACE: Regex = Regex::new(
        r"(?i)\b(uk|united kingdom|england|london|ireland|dublin|canada|toronto|montreal|ontario|quebec|british columbia|germany|berlin|munich|france|paris|netherlands|amsterdam|spain|madrid|barcelona|portugal|lisbon|poland|warsaw|sweden|stockholm|switzerland|zurich|israel|tel aviv|india|bangalore|bengaluru|hyderabad|pune|singapore|japan|tokyo|china|shanghai|beijing|australia|sydney|melbourne|brazil|sao paulo|mexico city|argentina|europe|emea|apac|latam)\b"
    )
    .unwrap();

    static ref BARE_WORK_MODE: Regex =
        Regex::new(r"(?i)^\s*(remote|hybrid|on-?site|in[- ]office)\s*$").unwrap();
}

/// Outcome of the title/location screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefilterDecision {
    pub reject: bool,
    pub reason: Option<String>,
    pub is_foreign: bool,
}

/// Screens a job title and location. Title rules are checked in order and
/// the first match wins.
pub fn screen_title(title: &str, location: Option<&str>) -> PrefilterDecision {
    let is_foreign = is_foreign_location(location);

    let reason = if let Some(m) = SENIORITY.find(title) {
        Some(format!("Seniority indicator: {}", m.as_str()))
    } else {
        NON_ENGINEERING
            .find(title)
            .map(|m| format!("Non-engineering role: {}", m.as_str()))
    };

    PrefilterDecision {
        reject: reason.is_some(),
        reason,
        is_foreign,
    }
}

/// True when the title names an internship or co-op without also naming a
/// new-grad / entry-level qualifier.
pub fn is_intern_only(title: &str) -> bool {
    INTERN_MARKER.is_match(title) && !NEW_GRAD_QUALIFIER.is_match(title)
}

/// Domestic unless a specific location carries no domestic indicator.
/// Blank locations and bare work-mode tokens default to domestic.
pub fn is_foreign_location(location: Option<&str>) -> bool {
    let location = match location.map(str::trim) {
        Some(l) if !l.is_empty() => l,
        _ => return false,
    };

    if US_COUNTRY.is_match(location) {
        return false;
    }
    let strong_domestic = US_STATE_NAME.is_match(location) || US_CITY.is_match(location);
    if FOREIGN_PLACE.is_match(location) && !strong_domestic {
        return true;
    }
    if strong_domestic || US_STATE_ABBREV.is_match(location) {
        return false;
    }
    !BARE_WORK_MODE.is_match(location)
}

/// A job that passed the pre-filter, annotated for the classifier stages.
#[derive(Debug, Clone)]
pub struct ScreenedJob {
    pub job: JobListing,
    pub is_foreign: bool,
    pub is_intern: bool,
}

/// A job the pre-filter rejected. Scored 0.0 and marked evaluated at once.
#[derive(Debug, Clone, Serialize)]
pub struct RegexRejection {
    pub job_id: i64,
    pub title: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Partition {
    pub regex_rejected: Vec<RegexRejection>,
    pub potentially_relevant: Vec<ScreenedJob>,
}

/// Splits jobs into regex rejects and jobs forwarded to the classifier.
pub fn partition(jobs: Vec<JobListing>) -> Partition {
    let mut out = Partition::default();
    for job in jobs {
        let decision = screen_title(&job.title, job.location.as_deref());
        if decision.reject {
            out.regex_rejected.push(RegexRejection {
                job_id: job.id,
                title: job.title,
                score: 0.0,
                reason: format!("Regex: {}", decision.reason.unwrap_or_default()),
            });
        } else {
            let is_intern = is_intern_only(&job.title);
            out.potentially_relevant.push(ScreenedJob {
                job,
                is_foreign: decision.is_foreign,
                is_intern,
            });
        }
    }
    out
}
