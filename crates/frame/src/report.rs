//! Cut-flow reports of named filters.

use quiver_core::{Error, Result};
use std::fmt;

/// Pass and total counts of one named filter.
#[derive(Clone, Debug, PartialEq)]
pub struct CutInfo {
    name: String,
    pass: u64,
    all: u64,
}

impl CutInfo {
    pub fn new(name: impl Into<String>, pass: u64, all: u64) -> Self {
        Self {
            name: name.into(),
            pass,
            all,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn all(&self) -> u64 {
        self.all
    }

    /// Percentage of entries that passed, `0` when the filter saw no entry.
    pub fn efficiency(&self) -> f64 {
        if self.all == 0 {
            0.0
        } else {
            100.0 * self.pass as f64 / self.all as f64
        }
    }
}

/// Named filter statistics in attachment order, ancestors first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CutFlowReport {
    cuts: Vec<CutInfo>,
}

impl CutFlowReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cut(&mut self, name: impl Into<String>, pass: u64, all: u64) {
        self.cuts.push(CutInfo::new(name, pass, all));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CutInfo> {
        self.cuts.iter()
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// The statistics of the filter called `name`.
    pub fn at(&self, name: &str) -> Result<&CutInfo> {
        if name.is_empty() {
            return Err(Error::invalid_name("cannot look up an unnamed filter"));
        }
        self.cuts.iter().find(|c| c.name == name).ok_or_else(|| {
            let available: Vec<&str> = self.cuts.iter().map(|c| c.name.as_str()).collect();
            Error::invalid_operation(format!(
                "no filter named {} in report, available: [{}]",
                name,
                available.join(", ")
            ))
        })
    }

    /// Adds the counts of another report of the same chain, cut by cut.
    pub fn merge(&mut self, other: &CutFlowReport) {
        for cut in &other.cuts {
            match self.cuts.iter_mut().find(|c| c.name == cut.name) {
                Some(existing) => {
                    existing.pass += cut.pass;
                    existing.all += cut.all;
                }
                None => self.cuts.push(cut.clone()),
            }
        }
    }
}

impl<'a> IntoIterator for &'a CutFlowReport {
    type Item = &'a CutInfo;
    type IntoIter = std::slice::Iter<'a, CutInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.cuts.iter()
    }
}

impl IntoIterator for CutFlowReport {
    type Item = CutInfo;
    type IntoIter = std::vec::IntoIter<CutInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.cuts.into_iter()
    }
}

impl fmt::Display for CutFlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_all = self.cuts.first().map(|c| c.all).unwrap_or(0);
        for cut in &self.cuts {
            let cumulative = if first_all == 0 {
                0.0
            } else {
                100.0 * cut.pass as f64 / first_all as f64
            };
            writeln!(
                f,
                "{:<10}: pass={:<10} all={:<10} -- eff={:3.2} % cumulative eff={:3.2} %",
                cut.name,
                cut.pass,
                cut.all,
                cut.efficiency(),
                cumulative
            )?;
        }
        Ok(())
    }
}
