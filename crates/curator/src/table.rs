//! Title-keyed registry of process records.
//!
//! The map sits behind one `RwLock`. Readers get snapshots, never references,
//! and every mutation is a closure run under the write lock, so nobody holds
//! a record across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::record::ProcessRecord;
use crate::types::ProcessSnapshot;

#[derive(Clone, Default)]
pub struct ProcessTable {
	records: Arc<RwLock<HashMap<String, ProcessRecord>>>,
}

impl ProcessTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace the record stored under `title`.
	pub async fn upsert(&self, title: &str, record: ProcessRecord) {
		self.records.write().await.insert(title.to_string(), record);
	}

	/// Insert only when `title` is free. Returns whether it was inserted.
	pub async fn insert_if_absent(&self, record: ProcessRecord) -> bool {
		let mut records = self.records.write().await;
		if records.contains_key(&record.title) {
			return false;
		}
		records.insert(record.title.clone(), record);
		true
	}

	pub async fn get(&self, title: &str) -> Option<ProcessSnapshot> {
		self.records.read().await.get(title).map(|r| r.snapshot())
	}

	pub async fn remove(&self, title: &str) -> Option<ProcessRecord> {
		self.records.write().await.remove(title)
	}

	/// Snapshots of every record, sorted by title.
	pub async fn list(&self) -> Vec<ProcessSnapshot> {
		let records = self.records.read().await;
		let mut out: Vec<ProcessSnapshot> = records.values().map(|r| r.snapshot()).collect();
		out.sort_by(|a, b| a.title.cmp(&b.title));
		out
	}

	pub async fn len(&self) -> usize {
		self.records.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.records.read().await.is_empty()
	}

	/// Run `f` on the record under `title`.
	pub async fn update<T>(&self, title: &str, f: impl FnOnce(&mut ProcessRecord) -> T) -> Option<T> {
		let mut records = self.records.write().await;
		records.get_mut(title).map(f)
	}

	/// Like [`update`](Self::update), but only while `cycle` is still the
	/// record's current supervision cycle.
	pub async fn update_cycle<T>(
		&self,
		title: &str,
		cycle: u64,
		f: impl FnOnce(&mut ProcessRecord) -> T,
	) -> Option<T> {
		let mut records = self.records.write().await;
		records.get_mut(title).filter(|r| r.cycle == cycle).map(f)
	}

	pub async fn titles(&self) -> Vec<String> {
		let mut titles: Vec<String> = self.records.read().await.keys().cloned().collect();
		titles.sort();
		titles
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ProcessState;

	fn record(title: &str) -> ProcessRecord {
		ProcessRecord::new(
			title.to_string(),
			"prog".to_string(),
			"sleep 1".to_string(),
			"/tmp/out.log".into(),
			"/tmp/err.log".into(),
		)
	}

	#[tokio::test]
	async fn test_upsert_get_remove() {
		let table = ProcessTable::new();
		assert!(table.get("a").await.is_none());

		table.upsert("a", record("a")).await;
		let snap = table.get("a").await.unwrap();
		assert_eq!(snap.title, "a");
		assert_eq!(snap.state, ProcessState::Stopped);

		let mut replacement = record("a");
		replacement.start_count = 4;
		table.upsert("a", replacement).await;
		assert_eq!(table.get("a").await.unwrap().start_count, 4);
		assert_eq!(table.len().await, 1);

		assert!(table.remove("a").await.is_some());
		assert!(table.is_empty().await);
	}

	#[tokio::test]
	async fn test_insert_if_absent() {
		let table = ProcessTable::new();
		assert!(table.insert_if_absent(record("web")).await);
		assert!(!table.insert_if_absent(record("web")).await);
		assert_eq!(table.len().await, 1);
	}

	#[tokio::test]
	async fn test_list_is_sorted_snapshot() {
		let table = ProcessTable::new();
		for t in ["c", "a", "b"] {
			table.upsert(t, record(t)).await;
		}
		let list = table.list().await;
		let titles: Vec<&str> = list.iter().map(|s| s.title.as_str()).collect();
		assert_eq!(titles, ["a", "b", "c"]);

		table.update("a", |r| r.state = ProcessState::Running).await;
		assert_eq!(list[0].state, ProcessState::Stopped);
		assert_eq!(table.get("a").await.unwrap().state, ProcessState::Running);
	}

	#[tokio::test]
	async fn test_update_cycle_ignores_stale_writer() {
		let table = ProcessTable::new();
		table.upsert("a", record("a")).await;
		let (old, _rx_old) = table.update("a", |r| r.begin_cycle()).await.unwrap();
		let (new, _rx_new) = table.update("a", |r| r.begin_cycle()).await.unwrap();
		assert_ne!(old, new);

		let stale = table
			.update_cycle("a", old, |r| r.state = ProcessState::Failed)
			.await;
		assert!(stale.is_none());
		assert_eq!(table.get("a").await.unwrap().state, ProcessState::Stopped);

		table
			.update_cycle("a", new, |r| r.state = ProcessState::Running)
			.await
			.unwrap();
		assert_eq!(table.get("a").await.unwrap().state, ProcessState::Running);
	}

	#[tokio::test]
	async fn test_concurrent_updates() {
		let table = ProcessTable::new();
		table.upsert("n", record("n")).await;
		let mut tasks = Vec::new();
		for _ in 0..32 {
			let t = table.clone();
			tasks.push(tokio::spawn(async move {
				t.update("n", |r| r.start_count += 1).await;
			}));
		}
		for task in tasks {
			task.await.unwrap();
		}
		assert_eq!(table.get("n").await.unwrap().start_count, 32);
	}
}
