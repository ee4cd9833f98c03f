//! Concept inference from question text
//!
//! Keyword heuristics classify what kind of quantity a question asks for.
//! The kind drives logical bounds (rates lie in [0, 1], counts are
//! non-negative) and whether structural decomposition is warranted.

/// What kind of quantity a question asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConceptKind {
    /// A fraction or probability in [0, 1]
    Rate,
    /// A number of discrete things
    Count,
    /// A total market value
    MarketSize,
    /// A monetary or other non-negative amount
    Amount,
    /// Growth or anything else without inherent bounds
    Unknown,
}

const UNBOUNDED_KEYWORDS: &[&str] = &["growth", "change", "delta", "성장", "증감"];

const RATE_KEYWORDS: &[&str] = &[
    "rate",
    "rates",
    "ratio",
    "fraction",
    "probability",
    "percentage",
    "percent",
    "share",
    "penetration",
    "churn",
    "비율",
    "확률",
    "점유율",
    "이탈률",
];

const MARKET_KEYWORDS: &[&str] = &["market size", "market", "시장", "규모"];

const COUNT_KEYWORDS: &[&str] = &[
    "number of",
    "count",
    "how many",
    "population",
    "households",
    "stores",
    "restaurants",
    "users",
    "customers",
    "employees",
    "개수",
    "인구",
    "수는",
];

const AMOUNT_KEYWORDS: &[&str] = &[
    "revenue",
    "sales",
    "price",
    "arpu",
    "ltv",
    "cac",
    "cost",
    "spend",
    "income",
    "매출",
    "가격",
];

const PEOPLE_KEYWORDS: &[&str] = &[
    "population",
    "people",
    "residents",
    "users",
    "customers",
    "subscribers",
    "employees",
    "households",
    "인구",
    "가구",
    "사용자",
    "고객",
];

/// ASCII keywords match whole words; other scripts match as substrings.
fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let padded = format!(" {} ", words.join(" "));
    keywords.iter().any(|k| {
        if k.is_ascii() {
            padded.contains(&format!(" {k} "))
        } else {
            text.contains(k)
        }
    })
}

impl ConceptKind {
    /// Infer the concept from a question
    pub fn infer(question: &str) -> Self {
        let q = question.to_lowercase();
        if contains_any(&q, UNBOUNDED_KEYWORDS) {
            ConceptKind::Unknown
        } else if contains_any(&q, RATE_KEYWORDS) {
            ConceptKind::Rate
        } else if contains_any(&q, MARKET_KEYWORDS) {
            ConceptKind::MarketSize
        } else if contains_any(&q, COUNT_KEYWORDS) {
            ConceptKind::Count
        } else if contains_any(&q, AMOUNT_KEYWORDS) {
            ConceptKind::Amount
        } else {
            ConceptKind::Unknown
        }
    }

    /// Whether answers of this kind are aggregates best explained structurally
    pub fn is_structural(&self) -> bool {
        matches!(self, ConceptKind::Count | ConceptKind::MarketSize)
    }

    /// Whether answers of this kind can never be negative
    pub fn is_non_negative(&self) -> bool {
        !matches!(self, ConceptKind::Unknown)
    }

    /// Short tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Rate => "rate",
            ConceptKind::Count => "count",
            ConceptKind::MarketSize => "market_size",
            ConceptKind::Amount => "amount",
            ConceptKind::Unknown => "unknown",
        }
    }
}

/// Whether the question counts people (or households) rather than units
/// that each serve many people, such as stores
pub fn counts_people(question: &str) -> bool {
    contains_any(&question.to_lowercase(), PEOPLE_KEYWORDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        assert_eq!(ConceptKind::infer("B2B SaaS churn rate"), ConceptKind::Rate);
        assert_eq!(
            ConceptKind::infer("What fraction of users convert?"),
            ConceptKind::Rate
        );
        assert_eq!(ConceptKind::infer("한국 이탈률"), ConceptKind::Rate);
    }

    #[test]
    fn test_growth_is_unbounded() {
        assert_eq!(ConceptKind::infer("annual growth rate"), ConceptKind::Unknown);
    }

    #[test]
    fn test_counts_and_markets() {
        assert_eq!(ConceptKind::infer("Seoul restaurant count"), ConceptKind::Count);
        assert_eq!(
            ConceptKind::infer("2099 Mars pizza delivery market size"),
            ConceptKind::MarketSize
        );
        assert_eq!(ConceptKind::infer("average ARPU"), ConceptKind::Amount);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        assert_eq!(ConceptKind::infer("corporate revenue"), ConceptKind::Amount);
        assert_eq!(ConceptKind::infer("account managers"), ConceptKind::Unknown);
    }

    #[test]
    fn test_structural() {
        assert!(ConceptKind::Count.is_structural());
        assert!(ConceptKind::MarketSize.is_structural());
        assert!(!ConceptKind::Rate.is_structural());
    }

    #[test]
    fn test_counts_people() {
        assert!(counts_people("Seoul population"));
        assert!(counts_people("number of paying users"));
        assert!(!counts_people("Seoul cafe count"));
    }
}
