//! Board documents, companion entry points and per-card mirrors.

use std::collections::HashSet;

use boardwise_core::board::validate_board_id;
use boardwise_core::Board;

use crate::error::StoreError;
use crate::fs::{self, file_names, read_json, read_text, remove_dir, remove_file, write_atomic};
use crate::layout::DataLayout;

const DEFAULT_AUTOMATION: &str = "\
-- Automation entry point for this board.
-- Runs with the same helpers as action rules (board, states, api, logger).
return nil
";

const DEFAULT_UI: &str = "\
<!-- UI entry point for this board. -->
<div class=\"board\"></div>
";

/// Board document files.
#[derive(Debug, Clone)]
pub struct BoardFiles {
    layout: DataLayout,
}

impl BoardFiles {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    fn check_id(id: &str) -> Result<(), StoreError> {
        validate_board_id(id).map_err(|e| StoreError::InvalidName(e.to_string()))
    }

    pub async fn exists(&self, id: &str) -> bool {
        Self::check_id(id).is_ok()
            && tokio::fs::try_exists(self.layout.board_doc(id))
                .await
                .unwrap_or(false)
    }

    /// Read one board document.
    pub async fn read(&self, id: &str) -> Result<Board, StoreError> {
        Self::check_id(id)?;
        read_json(&self.layout.board_doc(id))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Board",
                id: id.to_string(),
            })
    }

    /// Write a board document atomically.
    pub async fn write(&self, board: &Board) -> Result<(), StoreError> {
        Self::check_id(&board.name)?;
        fs::write_json(&self.layout.board_doc(&board.name), board).await
    }

    /// Ids of every board document on disk, sorted.
    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let names = file_names(&self.layout.boards_dir()).await?;
        Ok(names
            .iter()
            .filter_map(|n| n.strip_suffix(".json"))
            .filter(|id| validate_board_id(id).is_ok())
            .map(str::to_string)
            .collect())
    }

    /// Every readable board. Malformed documents are logged and skipped.
    pub async fn list(&self) -> Result<Vec<Board>, StoreError> {
        let mut boards = Vec::new();
        for id in self.list_ids().await? {
            match self.read(&id).await {
                Ok(board) => boards.push(board),
                Err(e) => tracing::warn!(board = %id, error = %e, "Skipping unreadable board"),
            }
        }
        Ok(boards)
    }

    /// Create the automation and UI entry points if missing. Returns
    /// whether anything was created.
    pub async fn ensure_companions(&self, id: &str) -> Result<bool, StoreError> {
        Self::check_id(id)?;
        let mut created = false;
        for (path, contents) in [
            (self.layout.automation(id), DEFAULT_AUTOMATION),
            (self.layout.ui(id), DEFAULT_UI),
        ] {
            if !tokio::fs::try_exists(&path).await.map_err(StoreError::io(&path))? {
                write_atomic(&path, contents.as_bytes()).await?;
                created = true;
            }
        }
        Ok(created)
    }

    pub async fn read_automation(&self, id: &str) -> Result<Option<String>, StoreError> {
        Self::check_id(id)?;
        read_text(&self.layout.automation(id)).await
    }

    pub async fn read_ui(&self, id: &str) -> Result<Option<String>, StoreError> {
        Self::check_id(id)?;
        read_text(&self.layout.ui(id)).await
    }

    /// Mirror each card's rule body and markup into `cards/`, removing
    /// mirrors of cards that are gone or whose content is now empty.
    pub async fn sync_card_files(&self, board: &Board) -> Result<(), StoreError> {
        Self::check_id(&board.name)?;
        let mut wanted = HashSet::new();

        for card in &board.cards {
            for (ext, body) in [("lua", &card.rules_code), ("html", &card.html)] {
                if body.trim().is_empty() {
                    continue;
                }
                let path = self.layout.card_file(&board.name, &card.name, ext);
                write_atomic(&path, body.as_bytes()).await?;
                wanted.insert(format!("{}.{ext}", card.name));
            }
        }

        let cards_dir = self.layout.cards_dir(&board.name);
        for stale in file_names(&cards_dir).await? {
            if !wanted.contains(&stale) {
                remove_file(&cards_dir.join(&stale)).await?;
                tracing::debug!(board = %board.name, file = %stale, "Removed stale card mirror");
            }
        }
        Ok(())
    }

    /// Read a per-card mirror.
    pub async fn read_card_file(
        &self,
        id: &str,
        card: &str,
        ext: &str,
    ) -> Result<Option<String>, StoreError> {
        Self::check_id(id)?;
        read_text(&self.layout.card_file(id, card, ext)).await
    }

    /// Remove the document, its companions and its card directory.
    /// Returns whether the document existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Self::check_id(id)?;
        let existed = remove_file(&self.layout.board_doc(id)).await?;
        remove_file(&self.layout.automation(id)).await?;
        remove_file(&self.layout.ui(id)).await?;
        remove_dir(&self.layout.board_dir(id)).await?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use boardwise_core::{Card, CardType};

    use super::*;

    fn files() -> (tempfile::TempDir, BoardFiles) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let files = BoardFiles::new(DataLayout::new(dir.path()));
        (dir, files)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, files) = files();
        let board = Board::new("demo").with_card(Card::new("k1", "counter", CardType::Action));
        files.write(&board).await.unwrap();

        let back = files.read("demo").await.unwrap();
        assert_eq!(back, board);
        assert!(files.exists("demo").await);
    }

    #[tokio::test]
    async fn missing_board_is_not_found() {
        let (_dir, files) = files();
        assert_matches!(files.read("ghost").await, Err(StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected_before_touching_disk() {
        let (_dir, files) = files();
        assert_matches!(files.read("../etc").await, Err(StoreError::InvalidName(_)));
        assert!(!files.exists("../etc").await);
    }

    #[tokio::test]
    async fn list_skips_malformed_documents() {
        let (_dir, files) = files();
        files.write(&Board::new("good")).await.unwrap();
        tokio::fs::write(files.layout().board_doc("bad"), b"{broken")
            .await
            .unwrap();
        files.ensure_companions("good").await.unwrap();

        let boards = files.list().await.unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].name, "good");
        assert_eq!(files.list_ids().await.unwrap(), vec!["bad", "good"]);
    }

    #[tokio::test]
    async fn companions_are_created_once() {
        let (_dir, files) = files();
        assert!(files.ensure_companions("demo").await.unwrap());
        assert!(!files.ensure_companions("demo").await.unwrap());
        assert!(files.read_automation("demo").await.unwrap().is_some());
        assert!(files.read_ui("demo").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn card_mirrors_track_the_document() {
        let (_dir, files) = files();
        let mut card = Card::new("k1", "counter", CardType::Action).with_rules("return 1");
        card.html = "<b>hi</b>".into();
        let board = Board::new("demo").with_card(card);
        files.sync_card_files(&board).await.unwrap();
        assert_eq!(
            files.read_card_file("demo", "counter", "lua").await.unwrap().as_deref(),
            Some("return 1")
        );

        files.sync_card_files(&Board::new("demo")).await.unwrap();
        assert!(files.read_card_file("demo", "counter", "lua").await.unwrap().is_none());
        assert!(files.read_card_file("demo", "counter", "html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let (_dir, files) = files();
        let board = Board::new("demo")
            .with_card(Card::new("k1", "counter", CardType::Action).with_rules("return 1"));
        files.write(&board).await.unwrap();
        files.ensure_companions("demo").await.unwrap();
        files.sync_card_files(&board).await.unwrap();

        assert!(files.delete("demo").await.unwrap());
        assert!(!files.exists("demo").await);
        assert!(files.read_automation("demo").await.unwrap().is_none());
        assert!(!files.layout().board_dir("demo").exists());
        assert!(!files.delete("demo").await.unwrap());
    }
}
