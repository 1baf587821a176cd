use std::fmt;

use crate::format::{format_bits, format_bytes};
use crate::stats::DirectionalStats;

pub const PRINT_WIDTH: usize = 80;
const UNAVAILABLE: &str = "n/a";

/// Boxed two-line title used for run and session headers.
pub fn banner(title: &str, subtitle: &str) -> String {
    let rule = "-".repeat(PRINT_WIDTH);
    let inner = PRINT_WIDTH - 2;
    format!("{rule}\n|{title:^inner$}|\n|{subtitle:^inner$}|\n{rule}\n")
}

/// Figures for one direction. Each one is independently optional so an
/// incomplete run still renders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionSummary {
    pub transferred: Option<f64>,
    pub speed: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub jitter: Option<f64>,
}

impl DirectionSummary {
    pub fn from_stats(stats: &DirectionalStats) -> Self {
        Self {
            transferred: stats.last_transferred().ok().map(|v| v as f64),
            speed: stats.last_speed().ok().map(|v| v as f64),
            min: stats.min_speed().map(|v| v as f64),
            max: stats.max_speed().map(|v| v as f64),
            jitter: stats.jitter_percent().ok(),
        }
    }

    fn csv_row(&self) -> String {
        [self.transferred, self.speed, self.min, self.max, self.jitter]
            .iter()
            .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn bytes_or_na(v: Option<f64>) -> String {
    v.map(format_bytes).unwrap_or_else(|| UNAVAILABLE.into())
}
fn bits_or_na(v: Option<f64>) -> String {
    v.map(format_bits).unwrap_or_else(|| UNAVAILABLE.into())
}

impl fmt::Display for DirectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {:<11}: {}\t{:<11}: {}",
            "Transferred",
            bytes_or_na(self.transferred),
            "Speed",
            bits_or_na(self.speed)
        )?;
        writeln!(
            f,
            "  {:<11}: {}\t{:<11}: {}",
            "Min",
            bits_or_na(self.min),
            "Max",
            bits_or_na(self.max)
        )?;
        match self.jitter {
            Some(j) => writeln!(f, "  {:<11}: {:2.2}%", "Jitter", j),
            None => writeln!(f, "  {:<11}: {}", "Jitter", UNAVAILABLE),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub upload: DirectionSummary,
    pub download: DirectionSummary,
}

impl Summary {
    /// Header line plus one row per direction, upload first.
    pub fn to_csv(&self) -> String {
        format!(
            "transferred,speed,min,max,jitter\n{}\n{}\n",
            self.upload.csv_row(),
            self.download.csv_row()
        )
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Upload:")?;
        write!(f, "{}", self.upload)?;
        writeln!(f, "Download:")?;
        write!(f, "{}", self.download)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_record;

    #[test]
    fn banner_layout() {
        let b = banner("roof antenna", "Test #2");
        let lines: Vec<&str> = b.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.len() == PRINT_WIDTH));
        assert!(lines[1].contains("roof antenna"));
        assert!(lines[2].trim_matches('|').trim() == "Test #2");
    }

    #[test]
    fn full_direction() {
        let mut stats = DirectionalStats::new();
        for s in [1024u64, 2048, 1536] {
            stats.record(
                parse_record(&format!("t,a,1,b,5001,3,0.0-1.0,{},{s}", s * 4)).unwrap(),
            );
        }
        let out = DirectionSummary::from_stats(&stats).to_string();
        assert!(out.contains("Transferred:   6.00 Kbytes\tSpeed      :   1.50 Kbits"));
        assert!(out.contains("Min        :   1.00 Kbits\tMax        :   2.00 Kbits"));
        assert!(out.contains("Jitter     : 66.67%"));
    }

    #[test]
    fn empty_direction_degrades() {
        let summary = Summary {
            upload: DirectionSummary::from_stats(&DirectionalStats::new()),
            download: DirectionSummary::default(),
        };
        let out = summary.to_string();
        assert!(out.starts_with("Upload:\n"));
        assert!(out.contains("Download:\n"));
        assert_eq!(out.matches("n/a").count(), 10);
    }

    #[test]
    fn csv_rows() {
        let summary = Summary {
            upload: DirectionSummary {
                transferred: Some(300.0),
                speed: Some(200.0),
                min: Some(50.0),
                max: Some(150.0),
                jitter: Some(50.0),
            },
            download: DirectionSummary {
                jitter: None,
                ..DirectionSummary::default()
            },
        };
        assert_eq!(
            summary.to_csv(),
            "transferred,speed,min,max,jitter\n300,200,50,150,50\n,,,,\n"
        );
    }
}
