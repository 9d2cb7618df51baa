use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Category;
use crate::store::ExpenseStore;

/// Expenses read per category when learning keywords.
pub const LEARN_SAMPLE_SIZE: usize = 100;
pub const MAX_LEARNED_KEYWORDS: usize = 10;
/// Lowest score that still assigns a category.
pub const MIN_SCORE: u32 = 2;

const PREDEFINED_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Food & Dining",
        &[
            "food", "restaurant", "cafe", "coffee", "lunch", "dinner", "breakfast", "makan",
            "restoran", "kafe", "kopi", "makan siang", "makan malam", "sarapan", "warung",
            "bakso", "nasi", "mie", "ayam", "ikan", "daging",
        ],
    ),
    (
        "Transportation",
        &[
            "transport", "taxi", "grab", "gojek", "uber", "bus", "train", "flight",
            "transportasi", "taksi", "ojek", "kereta", "pesawat", "bensin", "gas", "parking",
            "parkir", "tol", "toll",
        ],
    ),
    (
        "Shopping",
        &[
            "shop", "shopping", "mall", "store", "market", "supermarket", "grocery", "belanja",
            "toko", "pasar", "swalayan",
        ],
    ),
    (
        "Bills & Utilities",
        &[
            "bill", "utility", "electricity", "water", "internet", "phone", "electric",
            "tagihan", "listrik", "air", "telepon", "pdam", "pln",
        ],
    ),
    (
        "Entertainment",
        &[
            "entertainment", "movie", "cinema", "concert", "game", "netflix", "spotify",
            "hiburan", "film", "bioskop", "konser", "tiket",
        ],
    ),
    (
        "Healthcare",
        &[
            "health", "healthcare", "doctor", "hospital", "pharmacy", "medicine", "clinic",
            "kesehatan", "dokter", "rumah sakit", "apotek", "obat", "klinik", "medical",
        ],
    ),
    (
        "Education",
        &[
            "education", "school", "university", "course", "book", "tuition", "learning",
            "pendidikan", "sekolah", "universitas", "kursus", "buku", "belajar",
        ],
    ),
    (
        "Personal Care",
        &[
            "personal care", "haircut", "salon", "spa", "beauty", "skincare", "cosmetic",
            "perawatan", "potong rambut", "kecantikan",
        ],
    ),
    (
        "Travel",
        &[
            "travel", "hotel", "flight", "ticket", "vacation", "trip", "holiday", "perjalanan",
            "pesawat", "tiket", "liburan", "wisata",
        ],
    ),
    (
        "Gifts & Donations",
        &[
            "gift", "donation", "charity", "present", "birthday", "wedding", "hadiah", "donasi",
            "amal", "kado", "ulang tahun", "pernikahan",
        ],
    ),
    (
        "Subscriptions",
        &[
            "subscription", "netflix", "spotify", "youtube", "premium", "membership",
            "langganan", "berlangganan", "keanggotaan",
        ],
    ),
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

const SYNONYMS: &[(&str, &str)] = &[
    ("food", "Food & Dining"),
    ("misc", "Other"),
    ("childcare", "Other"),
    ("taxes", "Bills & Utilities"),
    ("housing", "Bills & Utilities"),
    ("vacation", "Travel"),
    ("travel", "Travel"),
    ("transportation", "Transportation"),
    ("shopping", "Shopping"),
    ("entertainment", "Entertainment"),
    ("healthcare", "Healthcare"),
    ("education", "Education"),
    ("personal care", "Personal Care"),
    ("gifts", "Gifts & Donations"),
    ("subscription", "Subscriptions"),
];

fn is_decorative(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F
            | 0x1F300..=0x1F5FF
            | 0x1F680..=0x1F6FF
            | 0x1F1E0..=0x1F1FF
            | 0x1F900..=0x1F9FF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
            | 0xFE0F
            | 0x200D
    )
}

/// Removes emoji and pictographic symbols, then trims.
pub fn strip_decorative_symbols(s: &str) -> String {
    s.chars()
        .filter(|c| !is_decorative(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Word lists and text hooks the classifier is configured with.
#[derive(Debug, Clone)]
pub struct Lexicon {
    /// Category name → built-in keywords (lowercase).
    pub keywords: BTreeMap<String, Vec<String>>,
    pub stop_words: BTreeSet<String>,
    /// Normalized hint → category name.
    pub synonyms: BTreeMap<String, String>,
    pub symbol_strip: fn(&str) -> String,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            keywords: PREDEFINED_KEYWORDS
                .iter()
                .map(|(name, words)| {
                    (name.to_string(), words.iter().map(|w| w.to_string()).collect())
                })
                .collect(),
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            synonyms: SYNONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            symbol_strip: strip_decorative_symbols,
        }
    }
}

impl Lexicon {
    /// Lowercased words longer than two characters, punctuation treated as
    /// a separator, stop words removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(*w))
            .map(str::to_string)
            .collect()
    }

    /// Words (longer than three characters) shared by at least two of the
    /// descriptions, most frequent first, ties alphabetical.
    pub fn learn_keywords(&self, descriptions: &[String]) -> Vec<String> {
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for description in descriptions {
            let distinct: BTreeSet<String> = self.tokenize(description).into_iter().collect();
            for word in distinct {
                *doc_freq.entry(word).or_default() += 1;
            }
        }
        let mut common: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(word, count)| *count >= 2 && word.chars().count() > 3)
            .collect();
        // BTreeMap iteration is alphabetical; the stable sort keeps that for ties.
        common.sort_by(|a, b| b.1.cmp(&a.1));
        common
            .into_iter()
            .take(MAX_LEARNED_KEYWORDS)
            .map(|(word, _)| word)
            .collect()
    }

    fn normalize_hint(&self, hint: &str) -> String {
        (self.symbol_strip)(&hint.trim().to_lowercase())
    }
}

#[derive(Debug, Clone)]
struct CategoryProfile {
    category: Category,
    name_lower: String,
    keywords: BTreeSet<String>,
    name_tokens: Vec<String>,
}

/// Category assignment for one import run. Profiles are sorted by name so
/// substring matching and score ties resolve deterministically.
#[derive(Debug, Clone)]
pub struct Classifier {
    lexicon: Lexicon,
    profiles: Vec<CategoryProfile>,
}

impl Classifier {
    /// Loads every category from the store and learns keywords from its
    /// existing expenses.
    pub fn build<S: ExpenseStore + ?Sized>(store: &S, lexicon: Lexicon) -> Result<Self> {
        let categories = store.list_categories()?;
        let mut learned = BTreeMap::new();
        for category in &categories {
            let descriptions = store.expense_descriptions(category.id, LEARN_SAMPLE_SIZE)?;
            let words = lexicon.learn_keywords(&descriptions);
            debug!(category = %category.name, sampled = descriptions.len(), learned = words.len(), "learned keywords");
            learned.insert(category.id, words);
        }
        let classifier = Self::from_parts(categories, &learned, lexicon);
        info!(categories = classifier.profiles.len(), "classifier ready");
        Ok(classifier)
    }

    pub fn from_parts(
        categories: Vec<Category>,
        learned: &BTreeMap<Uuid, Vec<String>>,
        lexicon: Lexicon,
    ) -> Self {
        let mut profiles: Vec<CategoryProfile> = categories
            .into_iter()
            .map(|category| {
                let mut keywords: BTreeSet<String> = lexicon
                    .keywords
                    .get(&category.name)
                    .into_iter()
                    .flatten()
                    .map(|k| k.to_lowercase())
                    .collect();
                keywords.extend(learned.get(&category.id).into_iter().flatten().cloned());
                CategoryProfile {
                    name_lower: category.name.to_lowercase(),
                    name_tokens: lexicon.tokenize(&category.name),
                    keywords,
                    category,
                }
            })
            .collect();
        profiles.sort_by(|a, b| a.name_lower.cmp(&b.name_lower));
        Self { lexicon, profiles }
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.profiles.iter().map(|p| &p.category)
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.categories().find(|c| c.id == id)
    }

    /// Hint first, then description keywords.
    pub fn classify(&self, hint: Option<&str>, description: &str) -> Option<&Category> {
        hint.and_then(|h| self.match_hint(h))
            .or_else(|| self.match_description(description))
    }

    /// Exact name, then synonym table, then substring containment either way.
    pub fn match_hint(&self, hint: &str) -> Option<&Category> {
        let hint = self.lexicon.normalize_hint(hint);
        if hint.is_empty() {
            return None;
        }

        if let Some(p) = self.profiles.iter().find(|p| p.name_lower == hint) {
            return Some(&p.category);
        }

        if let Some(target) = self.lexicon.synonyms.get(&hint) {
            let target = target.to_lowercase();
            if let Some(p) = self.profiles.iter().find(|p| p.name_lower == target) {
                debug!(hint = %hint, category = %p.category.name, "synonym match");
                return Some(&p.category);
            }
        }

        self.profiles
            .iter()
            .find(|p| p.name_lower.contains(&hint) || hint.contains(&p.name_lower))
            .map(|p| &p.category)
    }

    /// Keyword score of one category against a description.
    fn score(&self, profile: &CategoryProfile, lowered: &str, tokens: &[String]) -> u32 {
        let mut score = 0;
        for keyword in &profile.keywords {
            if tokens.iter().any(|t| t == keyword) {
                score += 3;
            } else if lowered.contains(keyword.as_str()) {
                score += 1;
            }
        }
        for word in &profile.name_tokens {
            if tokens.contains(word) {
                score += 2;
            }
        }
        score
    }

    /// Highest-scoring category, provided it reaches [`MIN_SCORE`] and no
    /// other category shares the score.
    pub fn match_description(&self, description: &str) -> Option<&Category> {
        let tokens = self.lexicon.tokenize(description);
        if tokens.is_empty() {
            return None;
        }
        let lowered = description.to_lowercase();

        let mut best: Option<(&CategoryProfile, u32)> = None;
        let mut tied = false;
        for profile in &self.profiles {
            let score = self.score(profile, &lowered, &tokens);
            match best {
                Some((_, top)) if score == top => tied = true,
                Some((_, top)) if score < top => {}
                _ => {
                    best = Some((profile, score));
                    tied = false;
                }
            }
        }

        match best {
            Some((profile, score)) if score >= MIN_SCORE && !tied => {
                debug!(category = %profile.category.name, score, "keyword match");
                Some(&profile.category)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::{NewCategory, NewExpense};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    const DEFAULT_NAMES: &[&str] = &[
        "Food & Dining",
        "Transportation",
        "Shopping",
        "Bills & Utilities",
        "Entertainment",
        "Healthcare",
        "Education",
        "Personal Care",
        "Travel",
        "Gifts & Donations",
        "Subscriptions",
        "Other",
    ];

    fn category(name: &str) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            icon: None,
            color: "#4CAF50".to_string(),
            is_default: true,
        }
    }

    fn classifier(names: &[&str]) -> Classifier {
        Classifier::from_parts(
            names.iter().map(|n| category(n)).collect(),
            &BTreeMap::new(),
            Lexicon::default(),
        )
    }

    fn name_of(c: Option<&Category>) -> Option<&str> {
        c.map(|c| c.name.as_str())
    }

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        let lex = Lexicon::default();
        assert_eq!(lex.tokenize("Lunch at the Restaurant!"), vec!["lunch", "restaurant"]);
        assert_eq!(lex.tokenize("Bills & Utilities"), vec!["bills", "utilities"]);
        assert!(lex.tokenize("a b c").is_empty());
    }

    #[test]
    fn test_learn_keywords_counts_documents() {
        let lex = Lexicon::default();
        let descriptions: Vec<String> = [
            "Groomer visit for dog",
            "dog food dog treats",
            "Groomer again",
            "vet checkup",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        // "dog" is too short; repeats inside one description count once.
        assert_eq!(lex.learn_keywords(&descriptions), vec!["groomer"]);
    }

    #[test]
    fn test_learn_keywords_caps_and_orders() {
        let lex = Lexicon::default();
        let mut descriptions = Vec::new();
        for _ in 0..3 {
            descriptions.push("zeta alpha".to_string());
        }
        for word in ["kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango"] {
            descriptions.push(word.to_string());
            descriptions.push(word.to_string());
        }
        let learned = lex.learn_keywords(&descriptions);
        assert_eq!(learned.len(), MAX_LEARNED_KEYWORDS);
        assert_eq!(&learned[..3], &["alpha", "zeta", "kilo"]);
    }

    #[test]
    fn test_description_keywords() {
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(name_of(c.classify(None, "restaurant")), Some("Food & Dining"));
        assert_eq!(name_of(c.classify(None, "Lunch at restaurant")), Some("Food & Dining"));
        assert_eq!(name_of(c.classify(None, "Grab ride to office")), Some("Transportation"));
        assert_eq!(name_of(c.classify(None, "Monthly internet bill")), Some("Bills & Utilities"));
        assert_eq!(name_of(c.classify(None, "Beli obat di apotek")), Some("Healthcare"));
    }

    #[test]
    fn test_unrelated_text_is_uncategorized() {
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(c.classify(None, "zxqv plorb"), None);
        assert_eq!(c.classify(None, ""), None);
    }

    #[test]
    fn test_tied_scores_are_uncategorized() {
        let c = classifier(DEFAULT_NAMES);
        // "netflix" is a keyword of both Entertainment and Subscriptions.
        assert_eq!(c.classify(None, "netflix"), None);
    }

    #[test]
    fn test_hint_exact_and_synonym() {
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(name_of(c.classify(Some("  TRAVEL "), "zzz")), Some("Travel"));
        assert_eq!(name_of(c.classify(Some("food"), "zzz")), Some("Food & Dining"));
        assert_eq!(name_of(c.classify(Some("Taxes"), "zzz")), Some("Bills & Utilities"));
        assert_eq!(name_of(c.classify(Some("misc"), "zzz")), Some("Other"));
    }

    #[test]
    fn test_hint_strips_symbols_and_matches_substring() {
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(name_of(c.classify(Some("🍔 Dining"), "zzz")), Some("Food & Dining"));
        assert_eq!(name_of(c.classify(Some("✈️ Travel"), "zzz")), Some("Travel"));
        assert_eq!(name_of(c.classify(Some("Shopping online"), "zzz")), Some("Shopping"));
    }

    #[test]
    fn test_hint_substring_uses_alphabetical_order() {
        let c = classifier(&["Personal Care", "Healthcare"]);
        assert_eq!(name_of(c.match_hint("care")), Some("Healthcare"));
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(name_of(c.match_hint("care")), Some("Healthcare"));
    }

    #[test]
    fn test_unmatched_hint_falls_back_to_keywords() {
        let c = classifier(DEFAULT_NAMES);
        assert_eq!(name_of(c.classify(Some("Pets"), "coffee beans")), Some("Food & Dining"));
        assert_eq!(name_of(c.classify(Some("🎉"), "coffee")), Some("Food & Dining"));
    }

    #[test]
    fn test_custom_symbol_strip() {
        fn drop_hash(s: &str) -> String {
            s.replace('#', "").trim().to_string()
        }
        let lexicon = Lexicon {
            symbol_strip: drop_hash,
            ..Lexicon::default()
        };
        let c = Classifier::from_parts(vec![category("Travel")], &BTreeMap::new(), lexicon);
        assert_eq!(name_of(c.match_hint("#travel")), Some("Travel"));
    }

    #[test]
    fn test_category_name_tokens_score() {
        let c = classifier(&["Pets", "Other"]);
        assert_eq!(name_of(c.classify(None, "pets supplies")), Some("Pets"));
    }

    #[test]
    fn test_build_learns_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        let (pets, _) = store.upsert_category(&NewCategory::named("Animals")).unwrap();
        for description in ["Groomer visit", "Groomer trim"] {
            store
                .create_expense(&NewExpense {
                    amount: Decimal::from(100),
                    currency: "IDR".to_string(),
                    description: description.to_string(),
                    category_id: Some(pets.id),
                    date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    tags: vec![],
                    location: None,
                    notes: None,
                    external_id: None,
                })
                .unwrap();
        }
        let c = Classifier::build(&store, Lexicon::default()).unwrap();
        assert_eq!(c.categories().count(), 13);
        assert_eq!(name_of(c.classify(None, "Groomer appointment")), Some("Animals"));
        assert_eq!(c.get(pets.id).map(|c| c.name.as_str()), Some("Animals"));
    }
}
