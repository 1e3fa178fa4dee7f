//! Search performance metrics for one site over one date range.

/// The fixed metric vocabulary returned by an aggregate Search Console query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Clicks,
    Impressions,
    Ctr,
    Position,
}

impl Metric {
    /// Query response order.
    pub const ALL: [Metric; 4] = [
        Metric::Clicks,
        Metric::Impressions,
        Metric::Ctr,
        Metric::Position,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Clicks => "clicks",
            Metric::Impressions => "impressions",
            Metric::Ctr => "ctr",
            Metric::Position => "position",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Named metric values in insertion order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: Vec<(String, f64)>,
}

impl MetricSet {
    /// Build from `(name, value)` pairs; a repeated name keeps its first position
    /// and takes the last value.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut values: Vec<(String, f64)> = vec![];
        for (name, value) in pairs {
            let name = name.into();
            match values.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => values.push((name, value)),
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
