use crate::model::InstalledApp;
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};

pub struct FuzzyMatcher {
    matcher: Matcher,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
        }
    }

    /// Scores each app's keywords against `query`. Returns `(index, score)`
    /// for matches only, best first; equal scores keep input order.
    pub fn match_apps(&mut self, query: &str, apps: &[InstalledApp]) -> Vec<(usize, u32)> {
        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let mut buf = Vec::new();

        let mut scored: Vec<(usize, u32)> = apps
            .iter()
            .enumerate()
            .filter_map(|(i, app)| {
                let keywords = app.keywords();
                let haystack = Utf32Str::new(&keywords, &mut buf);
                pattern.score(haystack, &mut self.matcher).map(|s| (i, s))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
    }
}
