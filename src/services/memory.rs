use crate::models::{Character, CharacterOrder, CharacterQuery, Outcome};
use crate::services::store::{EntityStore, StoreError, TallyReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    characters: BTreeMap<String, Character>,
    receipts: HashMap<(Uuid, String), DateTime<Utc>>,
}

/// Process-local entity store
///
/// Used when `database.backend = "memory"` and by the test suites. Each call
/// takes the table lock once, so increments are atomic like their SQL twins.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        let characters = characters
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Self {
            tables: RwLock::new(Tables {
                characters,
                receipts: HashMap::new(),
            }),
        }
    }

    /// Insert or replace a character
    pub async fn insert(&self, character: Character) {
        self.tables
            .write()
            .await
            .characters
            .insert(character.id.clone(), character);
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables.read().await.characters.keys().cloned().collect())
    }

    async fn find(&self, id: &str) -> Result<Option<Character>, StoreError> {
        Ok(self.tables.read().await.characters.get(id).cloned())
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Character>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.characters.get(id).cloned())
            .collect())
    }

    async fn list(&self, query: &CharacterQuery) -> Result<Vec<Character>, StoreError> {
        let tables = self.tables.read().await;
        let mut characters: Vec<Character> = tables
            .characters
            .values()
            .filter(|c| query.accepts(c))
            .cloned()
            .collect();

        // BTreeMap order keeps ties sorted by id, matching the SQL tiebreak
        match query.order {
            CharacterOrder::MostWins => characters.sort_by(|a, b| b.wins.cmp(&a.wins)),
            CharacterOrder::MostLosses => characters.sort_by(|a, b| b.losses.cmp(&a.losses)),
        }

        if let Some(limit) = query.limit {
            characters.truncate(limit);
        }

        Ok(characters)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.tables.read().await.characters.len() as u64)
    }

    async fn create(&self, character: Character) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.characters.entry(character.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(character);
                Ok(true)
            }
        }
    }

    async fn record_outcome(
        &self,
        vote_id: Uuid,
        id: &str,
        outcome: Outcome,
    ) -> Result<TallyReceipt, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables { characters, receipts } = &mut *tables;

        let character = characters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("character {}", id)))?;

        let key = (vote_id, id.to_string());
        if receipts.contains_key(&key) {
            return Ok(TallyReceipt::Duplicate);
        }
        receipts.insert(key, Utc::now());

        match outcome {
            Outcome::Win => character.wins += 1,
            Outcome::Loss => character.losses += 1,
        }

        Ok(TallyReceipt::Applied)
    }

    async fn increment_reports(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.characters.get_mut(id).map(|c| {
            c.report_count += 1;
            c.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let existed = tables.characters.remove(id).is_some();
        if existed {
            tables.receipts.retain(|(_, character_id), _| character_id != id);
        }
        Ok(existed)
    }

    async fn prune_receipts(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.receipts.len();
        tables.receipts.retain(|_, applied_at| *applied_at >= cutoff);
        Ok((before - tables.receipts.len()) as u64)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: &str, wins: u64, losses: u64, race: &str) -> Character {
        let mut c = Character::new(id, format!("Pilot {}", id));
        c.wins = wins;
        c.losses = losses;
        c.race = race.to_string();
        c
    }

    #[tokio::test]
    async fn test_record_outcome_is_idempotent_per_vote() {
        let store = InMemoryEntityStore::with_characters([character("a", 0, 0, "Amarr")]);
        let vote = Uuid::new_v4();

        assert_eq!(
            store.record_outcome(vote, "a", Outcome::Win).await.unwrap(),
            TallyReceipt::Applied
        );
        assert_eq!(
            store.record_outcome(vote, "a", Outcome::Win).await.unwrap(),
            TallyReceipt::Duplicate
        );
        store.record_outcome(Uuid::new_v4(), "a", Outcome::Loss).await.unwrap();

        let a = store.find("a").await.unwrap().unwrap();
        assert_eq!((a.wins, a.losses), (1, 1));
    }

    #[tokio::test]
    async fn test_record_outcome_on_missing_character() {
        let store = InMemoryEntityStore::new();
        let err = store
            .record_outcome(Uuid::new_v4(), "ghost", Outcome::Loss)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_limits() {
        let store = InMemoryEntityStore::with_characters([
            character("a", 1, 9, "Amarr"),
            character("b", 5, 0, "Caldari"),
            character("c", 3, 2, "Amarr"),
        ]);

        let top = store.list(&CharacterQuery::most_wins(2)).await.unwrap();
        assert_eq!(top.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), ["b", "c"]);

        let amarr = store
            .list(&CharacterQuery::most_wins(10).with_race("Amarr"))
            .await
            .unwrap();
        assert_eq!(amarr.len(), 2);

        let worst = store.list(&CharacterQuery::most_losses(1)).await.unwrap();
        assert_eq!(worst[0].id, "a");
    }

    #[tokio::test]
    async fn test_reports_and_delete() {
        let store = InMemoryEntityStore::with_characters([character("a", 0, 0, "")]);

        let reported = store.increment_reports("a").await.unwrap().unwrap();
        assert_eq!(reported.report_count, 1);
        assert!(store.increment_reports("zz").await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_keeps_existing_character() {
        let store = InMemoryEntityStore::with_characters([character("a", 4, 2, "Amarr")]);

        assert!(!store.create(character("a", 0, 0, "Gallente")).await.unwrap());
        let a = store.find("a").await.unwrap().unwrap();
        assert_eq!((a.wins, a.losses, a.race.as_str()), (4, 2, "Amarr"));

        assert!(store.create(character("b", 0, 0, "Minmatar")).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.list_ids().await.unwrap().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_prune_receipts() {
        let store = InMemoryEntityStore::with_characters([character("a", 0, 0, "")]);
        store.record_outcome(Uuid::new_v4(), "a", Outcome::Win).await.unwrap();

        let pruned = store
            .prune_receipts(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
    }
}
