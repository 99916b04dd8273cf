//! GitHub REST data source
//!
//! Read-only queries the dashboard needs: repository summary, commit and
//! pull-request counts, the latest release and recent commits with their
//! diff stats.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("repodeck/", env!("CARGO_PKG_VERSION"));
const RETRY_ATTEMPTS: usize = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Upper bound on pages walked when counting pull requests since a date
const MAX_PR_PAGES: usize = 10;
/// Longest wait honored from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("Failed to reach GitHub API: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse GitHub response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, GithubError>;

/// Repository summary
#[derive(Debug, Clone, PartialEq)]
pub struct RepoInfo {
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub published_at: Option<String>,
    pub html_url: String,
}

impl Release {
    /// Release title, falling back to the tag
    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// Lines changed by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffStats {
    pub additions: u64,
    pub deletions: u64,
    pub total: u64,
}

/// One row of the recent-commits table
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSummary {
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    pub date: String,
    pub stats: DiffStats,
}

/// Full detail of a single commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitDetail {
    pub sha: String,
    pub short_message: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_date: String,
    pub files_changed: usize,
}

/// Read-only repository data the dashboard consumes.
///
/// `repo` is always `owner/name`.
pub trait RepoDataSource {
    fn get_repo_info(&self, repo: &str) -> Result<RepoInfo>;

    /// Number of commits since `since`, or in total
    fn get_commits_since(&self, repo: &str, since: Option<OffsetDateTime>) -> Result<u64>;

    /// Number of pull requests (any state) created since `since`, or in total
    fn get_prs(&self, repo: &str, since: Option<OffsetDateTime>) -> Result<u64>;

    fn get_last_release(&self, repo: &str) -> Result<Option<Release>>;

    /// Newest `x` commits, newest first, with diff stats
    fn get_last_x_commits(&self, repo: &str, x: usize) -> Result<Vec<CommitSummary>>;

    /// Head commit of `branch`
    fn get_last_commit(&self, repo: &str, branch: &str) -> Result<CommitDetail>;
}

#[derive(Debug, Deserialize)]
struct RepoDto {
    name: String,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    open_issues_count: u64,
    #[serde(default)]
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitActorDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    date: String,
}

#[derive(Debug, Deserialize)]
struct CommitInnerDto {
    #[serde(default)]
    message: String,
    author: Option<GitActorDto>,
}

#[derive(Debug, Deserialize)]
struct StatsDto {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct FileDto {}

#[derive(Debug, Deserialize)]
struct CommitDto {
    sha: String,
    commit: CommitInnerDto,
    stats: Option<StatsDto>,
    files: Option<Vec<FileDto>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDto {
    tag_name: String,
    name: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct PullDto {
    created_at: String,
}

impl From<RepoDto> for RepoInfo {
    fn from(dto: RepoDto) -> Self {
        Self {
            name: dto.name,
            description: dto.description,
            stars: dto.stargazers_count,
            forks: dto.forks_count,
            open_issues: dto.open_issues_count,
            default_branch: dto.default_branch,
        }
    }
}

impl From<ReleaseDto> for Release {
    fn from(dto: ReleaseDto) -> Self {
        Self {
            tag_name: dto.tag_name,
            name: dto.name,
            published_at: dto.published_at,
            html_url: dto.html_url,
        }
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}

impl From<CommitDto> for CommitSummary {
    fn from(dto: CommitDto) -> Self {
        let author = dto.commit.author.unwrap_or(GitActorDto {
            name: String::new(),
            email: String::new(),
            date: String::new(),
        });
        let stats = dto
            .stats
            .map(|s| DiffStats {
                additions: s.additions,
                deletions: s.deletions,
                total: s.total,
            })
            .unwrap_or_default();
        Self {
            sha: dto.sha,
            message: first_line(&dto.commit.message),
            author: author.name,
            date: author.date,
            stats,
        }
    }
}

impl From<CommitDto> for CommitDetail {
    fn from(dto: CommitDto) -> Self {
        let files_changed = dto.files.as_ref().map(Vec::len).unwrap_or(0);
        let author = dto.commit.author.unwrap_or(GitActorDto {
            name: String::new(),
            email: String::new(),
            date: String::new(),
        });
        Self {
            short_message: first_line(&dto.commit.message),
            message: dto.commit.message.trim_end().to_string(),
            sha: dto.sha,
            author_name: author.name,
            author_email: author.email,
            author_date: author.date,
            files_changed,
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| GithubError::Decode(e.to_string()))
}

/// Page number of the `rel="last"` link in a `Link` header
fn last_page(link_header: &str) -> Option<u64> {
    link_header
        .split(',')
        .find(|part| part.contains("rel=\"last\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            Url::parse(part.get(start..end)?).ok()
        })
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "page")
                .and_then(|(_, value)| value.parse().ok())
        })
}

/// Count from a `per_page=1` listing: the last page number, else the items shown
fn count_from_listing(link_header: Option<&str>, items_on_page: usize) -> u64 {
    link_header
        .and_then(last_page)
        .unwrap_or(items_on_page as u64)
}

/// Count pull requests (newest first) created at or after `since`.
/// Returns the count and whether an older one was reached.
fn count_created_since(pulls: &[PullDto], since: OffsetDateTime) -> (u64, bool) {
    let mut count = 0;
    for pull in pulls {
        match OffsetDateTime::parse(&pull.created_at, &Rfc3339) {
            Ok(created) if created >= since => count += 1,
            Ok(_) => return (count, true),
            Err(e) => debug!("Skipping pull request with bad date {}: {}", pull.created_at, e),
        }
    }
    (count, false)
}

fn format_since(since: OffsetDateTime) -> Result<String> {
    since
        .format(&Rfc3339)
        .map_err(|e| GithubError::Decode(e.to_string()))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

/// Seconds from a `Retry-After` header, capped at [`MAX_RETRY_AFTER`]
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn backoff(attempt: usize) -> Duration {
    let ms = 300_u64.saturating_mul(2_u64.saturating_pow(attempt as u32));
    Duration::from_millis(ms.min(8_000))
}

/// GitHub REST client
pub struct GithubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(API_BASE, token)
    }

    /// Client against another API root (GitHub Enterprise)
    pub fn with_base_url(api_base: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// GET with bounded retry on rate limiting and server errors
    fn get(&self, path_and_query: &str) -> Result<Response> {
        let url = format!("{}{}", self.api_base, path_and_query);
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }

            let response = match request.send() {
                Ok(response) => response,
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    warn!("GitHub request to {} failed: {}", url, e);
                    std::thread::sleep(backoff(attempt));
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let should_retry = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if should_retry && attempt < RETRY_ATTEMPTS {
                let delay = retry_after(&response).unwrap_or_else(|| backoff(attempt));
                warn!("GitHub returned {} for {}, retrying in {:?}", status, url, delay);
                std::thread::sleep(delay);
                attempt += 1;
                continue;
            }

            let body = response.text().unwrap_or_default();
            return Err(GithubError::Status {
                status: status.as_u16(),
                message: first_line(&body),
            });
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let body = self.get(path_and_query)?.text()?;
        decode(&body)
    }

    /// Total for a listing endpoint, fetched with `per_page=1`
    fn count(&self, path_and_query: &str) -> Result<u64> {
        let response = self.get(path_and_query)?;
        let link = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let items: Vec<serde_json::Value> = decode(&response.text()?)?;
        Ok(count_from_listing(link.as_deref(), items.len()))
    }
}

impl RepoDataSource for GithubClient {
    fn get_repo_info(&self, repo: &str) -> Result<RepoInfo> {
        let dto: RepoDto = self.get_json(&format!("/repos/{}", repo))?;
        Ok(dto.into())
    }

    fn get_commits_since(&self, repo: &str, since: Option<OffsetDateTime>) -> Result<u64> {
        let mut query = format!("/repos/{}/commits?per_page=1", repo);
        if let Some(since) = since {
            query.push_str(&format!("&since={}", format_since(since)?));
        }
        self.count(&query)
    }

    fn get_prs(&self, repo: &str, since: Option<OffsetDateTime>) -> Result<u64> {
        let Some(since) = since else {
            return self.count(&format!("/repos/{}/pulls?state=all&per_page=1", repo));
        };

        let mut total = 0;
        for page in 1..=MAX_PR_PAGES {
            let pulls: Vec<PullDto> = self.get_json(&format!(
                "/repos/{}/pulls?state=all&sort=created&direction=desc&per_page=100&page={}",
                repo, page
            ))?;
            let (count, reached_older) = count_created_since(&pulls, since);
            total += count;
            if reached_older || pulls.len() < 100 {
                break;
            }
        }
        Ok(total)
    }

    fn get_last_release(&self, repo: &str) -> Result<Option<Release>> {
        let releases: Vec<ReleaseDto> =
            self.get_json(&format!("/repos/{}/releases?per_page=1", repo))?;
        Ok(releases.into_iter().next().map(Release::from))
    }

    fn get_last_x_commits(&self, repo: &str, x: usize) -> Result<Vec<CommitSummary>> {
        if x == 0 {
            return Ok(Vec::new());
        }
        // The listing has no stats, so each commit is fetched individually
        let listing: Vec<CommitDto> =
            self.get_json(&format!("/repos/{}/commits?per_page={}", repo, x.min(100)))?;
        listing
            .into_iter()
            .take(x)
            .map(|commit| {
                let full: CommitDto =
                    self.get_json(&format!("/repos/{}/commits/{}", repo, commit.sha))?;
                Ok(full.into())
            })
            .collect()
    }

    fn get_last_commit(&self, repo: &str, branch: &str) -> Result<CommitDetail> {
        let dto: CommitDto = self.get_json(&format!("/repos/{}/commits/{}", repo, branch))?;
        Ok(dto.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const COMMIT_JSON: &str = r#"{
        "sha": "7fd1a60b01f91b314f59955a4e4d4e80d8edf11d",
        "commit": {
            "message": "Merge pull request #6 from feature\n\nLong description",
            "author": {
                "name": "The Octocat",
                "email": "octocat@nowhere.com",
                "date": "2012-03-06T23:06:50Z"
            }
        },
        "stats": { "additions": 104, "deletions": 4, "total": 108 },
        "files": [{ "filename": "README" }, { "filename": "src/main.rs" }]
    }"#;

    #[test]
    fn test_repo_info_from_json() {
        let dto: RepoDto = decode(
            r#"{"name":"Hello-World","description":null,"stargazers_count":80,
                "forks_count":9,"open_issues_count":2,"default_branch":"master","private":false}"#,
        )
        .unwrap();
        let info = RepoInfo::from(dto);
        assert_eq!(info.name, "Hello-World");
        assert_eq!(info.description, None);
        assert_eq!((info.stars, info.forks, info.open_issues), (80, 9, 2));
        assert_eq!(info.default_branch, "master");
    }

    #[test]
    fn test_commit_summary_and_detail() {
        let summary = CommitSummary::from(decode::<CommitDto>(COMMIT_JSON).unwrap());
        assert_eq!(summary.message, "Merge pull request #6 from feature");
        assert_eq!(summary.author, "The Octocat");
        assert_eq!(
            summary.stats,
            DiffStats {
                additions: 104,
                deletions: 4,
                total: 108
            }
        );

        let detail = CommitDetail::from(decode::<CommitDto>(COMMIT_JSON).unwrap());
        assert_eq!(detail.short_message, "Merge pull request #6 from feature");
        assert!(detail.message.ends_with("Long description"));
        assert_eq!(detail.author_email, "octocat@nowhere.com");
        assert_eq!(detail.author_date, "2012-03-06T23:06:50Z");
        assert_eq!(detail.files_changed, 2);
    }

    #[test]
    fn test_listing_commit_without_stats() {
        let summary = CommitSummary::from(
            decode::<CommitDto>(r#"{"sha":"abc","commit":{"message":"init","author":null}}"#)
                .unwrap(),
        );
        assert_eq!(summary.stats, DiffStats::default());
        assert_eq!(summary.author, "");
    }

    #[test]
    fn test_decode_error() {
        assert!(matches!(decode::<RepoDto>("{"), Err(GithubError::Decode(_))));
    }

    #[test]
    fn test_last_page_from_link_header() {
        let link = r#"<https://api.github.com/repositories/1300192/commits?per_page=1&page=2>; rel="next", <https://api.github.com/repositories/1300192/commits?per_page=1&page=4213>; rel="last""#;
        assert_eq!(last_page(link), Some(4213));
        assert_eq!(last_page(r#"<https://api.github.com/x?page=2>; rel="next""#), None);
        assert_eq!(count_from_listing(Some(link), 1), 4213);
        assert_eq!(count_from_listing(None, 1), 1);
        assert_eq!(count_from_listing(None, 0), 0);
    }

    #[test]
    fn test_count_created_since_stops_at_older() {
        let pulls: Vec<PullDto> = decode(
            r#"[{"created_at":"2024-05-03T10:00:00Z"},
                {"created_at":"2024-05-02T10:00:00Z"},
                {"created_at":"2024-04-01T10:00:00Z"},
                {"created_at":"2024-05-05T10:00:00Z"}]"#,
        )
        .unwrap();
        let (count, older) = count_created_since(&pulls, datetime!(2024-05-01 0:00 UTC));
        assert_eq!(count, 2);
        assert!(older);
    }

    #[test]
    fn test_release_title_falls_back_to_tag() {
        let release = Release::from(
            decode::<ReleaseDto>(r#"{"tag_name":"v1.0.0","name":"","published_at":null}"#)
                .unwrap(),
        );
        assert_eq!(release.title(), "v1.0.0");
    }

    #[test]
    fn test_format_since_is_rfc3339() {
        assert_eq!(
            format_since(datetime!(2024-05-01 12:30:00 UTC)).unwrap(),
            "2024-05-01T12:30:00Z"
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(0), Duration::from_millis(300));
        assert_eq!(backoff(10), Duration::from_millis(8_000));
    }

    #[test]
    fn test_retry_after_is_capped() {
        assert_eq!(parse_retry_after(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("3600"), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
