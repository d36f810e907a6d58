use std::collections::{BTreeSet, HashMap};

use crate::models::PoiRecord;

/// Lexical inverted index over normalized POI tokens
///
/// POIs live in an arena (`pois`) in insertion order; postings refer to arena
/// slots. The index is built once and is read-only afterwards, so it can be
/// shared across matching tasks behind an `Arc` without locking.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    pois: Vec<PoiRecord>,
    slots: HashMap<String, usize>,
    postings: HashMap<String, BTreeSet<usize>>,
}

impl CatalogIndex {
    /// Build the index from the full POI set
    ///
    /// Tokens come from each POI's normalized text (or its name when it was
    /// never normalized). A repeated identifier keeps the first record.
    pub fn build(pois: impl IntoIterator<Item = PoiRecord>) -> Self {
        let mut index = Self::default();

        for poi in pois {
            if index.slots.contains_key(&poi.id) {
                tracing::warn!("Duplicate POI id {}, keeping first occurrence", poi.id);
                continue;
            }

            let slot = index.pois.len();
            for token in poi.tokens() {
                index
                    .postings
                    .entry(token.to_string())
                    .or_default()
                    .insert(slot);
            }
            index.slots.insert(poi.id.clone(), slot);
            index.pois.push(poi);
        }

        tracing::debug!(
            "Catalog index built: {} POIs, {} distinct tokens",
            index.pois.len(),
            index.postings.len()
        );

        index
    }

    /// Rank POIs by how many query tokens hit their posting sets
    ///
    /// Ties on hit count are broken by POI identifier so results are
    /// reproducible. Unknown tokens contribute nothing.
    pub fn query<S: AsRef<str>>(&self, tokens: &[S], limit: usize) -> Vec<&PoiRecord> {
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: HashMap<usize, u32> = HashMap::new();
        for token in tokens {
            if let Some(slots) = self.postings.get(token.as_ref()) {
                for &slot in slots {
                    *hits.entry(slot).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(usize, u32)> = hits.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| self.pois[a.0].id.cmp(&self.pois[b.0].id))
        });
        ranked.truncate(limit);

        ranked.into_iter().map(|(slot, _)| &self.pois[slot]).collect()
    }

    pub fn get(&self, poi_id: &str) -> Option<&PoiRecord> {
        self.slots.get(poi_id).map(|&slot| &self.pois[slot])
    }

    /// Identifiers in the posting set of `token`
    pub fn postings(&self, token: &str) -> Vec<&str> {
        self.postings
            .get(token)
            .map(|slots| slots.iter().map(|&s| self.pois[s].id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    /// All indexed POIs in insertion order
    pub fn pois(&self) -> &[PoiRecord] {
        &self.pois
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(id: &str, normalized: &str) -> PoiRecord {
        let mut poi = PoiRecord::new(id, normalized.replace(' ', ""), 39.9, 116.3);
        poi.normalized = Some(normalized.to_string());
        poi
    }

    fn sample_index() -> CatalogIndex {
        CatalogIndex::build(vec![
            poi("P1", "北京市 海淀区 中关村大街 1号"),
            poi("P2", "北京市 海淀区 学院路 15号"),
            poi("P3", "北京市 朝阳区 望京街 10号"),
        ])
    }

    #[test]
    fn test_query_ranks_by_hit_count() {
        let index = sample_index();
        let results = index.query(&["北京市", "海淀区", "中关村大街"], 10);

        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
    }

    #[test]
    fn test_query_ties_break_by_id() {
        let index = sample_index();
        let results = index.query(&["北京市"], 10);

        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3"]);
    }

    #[test]
    fn test_query_respects_limit() {
        let index = sample_index();
        assert_eq!(index.query(&["北京市"], 2).len(), 2);
        assert!(index.query(&["北京市"], 0).is_empty());
    }

    #[test]
    fn test_unknown_and_empty_tokens() {
        let index = sample_index();
        assert!(index.query(&["上海市"], 10).is_empty());
        assert!(index.query::<&str>(&[], 10).is_empty());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let index = CatalogIndex::build(vec![poi("P1", "甲 乙"), poi("P1", "丙 丁")]);
        assert_eq!(index.len(), 1);
        assert!(index.postings("丙").is_empty());
        assert_eq!(index.postings("甲"), vec!["P1"]);
    }

    #[test]
    fn test_unnormalized_poi_indexes_name() {
        let index = CatalogIndex::build(vec![PoiRecord::new("P9", "国贸大厦", 39.9, 116.4)]);
        assert_eq!(index.postings("国贸大厦"), vec!["P9"]);
    }
}
