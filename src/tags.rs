//! The fixed 50-tag vocabulary linking model outputs to tag names

use crate::constants::NUM_TAGS;
use crate::error::{TaggerError, TaggerResult};

/// The 50 Last.fm tags the Million Song Dataset weights were trained
/// against. Index position is the contract with the network output: the
/// i-th sigmoid unit scores the i-th tag.
const LAST_FM_TAGS: [&str; NUM_TAGS] = [
    "rock",
    "pop",
    "alternative",
    "indie",
    "electronic",
    "female vocalists",
    "dance",
    "00s",
    "alternative rock",
    "jazz",
    "beautiful",
    "metal",
    "chillout",
    "male vocalists",
    "classic rock",
    "soul",
    "indie rock",
    "Mellow",
    "electronica",
    "80s",
    "folk",
    "90s",
    "chill",
    "instrumental",
    "punk",
    "oldies",
    "blues",
    "hard rock",
    "ambient",
    "acoustic",
    "experimental",
    "female vocalist",
    "guitar",
    "Hip-Hop",
    "70s",
    "party",
    "country",
    "easy listening",
    "sexy",
    "catchy",
    "funk",
    "electro",
    "heavy metal",
    "Progressive rock",
    "60s",
    "rnb",
    "indie pop",
    "sad",
    "House",
    "happy",
];

/// An ordered, immutable list of exactly 50 tag names.
///
/// Vocabularies are passed explicitly to whatever consumes them, never read
/// from ambient state.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    tags: Vec<String>,
}

impl TagVocabulary {
    /// Builds a vocabulary from custom tag names.
    ///
    /// # Arguments
    ///
    /// * `tags` - The tag names, in output-unit order.
    ///
    /// # Returns
    ///
    /// * The vocabulary, or an error if `tags` does not hold exactly 50 names.
    pub fn new(tags: Vec<String>) -> TaggerResult<Self> {
        if tags.len() != NUM_TAGS {
            return Err(TaggerError::WrongVocabularySize { got: tags.len() });
        }
        Ok(Self { tags })
    }

    /// The vocabulary the pretrained Million Song Dataset weights use.
    pub fn last_fm() -> Self {
        Self {
            tags: LAST_FM_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The tag name at an output-unit index.
    pub fn name(&self, index: usize) -> &str {
        &self.tags[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.as_str())
    }
}
