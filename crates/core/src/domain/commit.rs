use serde::{Deserialize, Serialize};

/// One entry of a repository's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub author: Author,
    /// Full commit message, including the body
    pub message: String,
    pub timestamp: Timestamp,
}

impl Commit {
    /// First line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Commit author information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Commit timestamp (Unix timestamp with timezone offset in minutes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// Calendar date in the author's own timezone as `YYYY-MM-DD`
    pub fn date(&self) -> String {
        let local = self.seconds + i64::from(self.offset_minutes) * 60;
        let (year, month, day) = civil_from_days(local.div_euclid(86_400));
        format!("{:04}-{:02}-{:02}", year, month, day)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.date())
    }
}

// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

impl std::fmt::Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.author.name)?;
        writeln!(f, "{}", self.timestamp)?;
        writeln!(f, "{}", self.id)?;
        writeln!(f)?;
        write!(f, "{}", self.message.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> Commit {
        Commit {
            id: "0123456789abcdef0123456789abcdef01234567".to_string(),
            author: Author {
                name: "Test User".to_string(),
                email: "test@example.com".to_string(),
            },
            message: message.to_string(),
            timestamp: Timestamp::new(0, 0),
        }
    }

    #[test]
    fn test_timestamp_date() {
        assert_eq!(Timestamp::new(0, 0).date(), "1970-01-01");
        // 2013-02-28T23:30:00Z, one hour ahead is already March
        assert_eq!(Timestamp::new(1_362_094_200, 0).date(), "2013-02-28");
        assert_eq!(Timestamp::new(1_362_094_200, 60).date(), "2013-03-01");
        assert_eq!(Timestamp::new(951_782_400, 0).date(), "2000-02-29");
        assert_eq!(Timestamp::new(-86_400, 0).date(), "1969-12-31");
    }

    #[test]
    fn test_summary_is_first_line() {
        assert_eq!(commit("Fix parser\n\nLong body").summary(), "Fix parser");
        assert_eq!(commit("").summary(), "");
    }

    #[test]
    fn test_display_layout() {
        let text = commit("Initial commit\n").to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Test User");
        assert_eq!(lines[1], "1970-01-01");
        assert_eq!(lines[2], "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Initial commit");
    }
}
