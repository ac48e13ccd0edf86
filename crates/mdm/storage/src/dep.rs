//! Enrollment-program state.

use mdm_core::{
    AutoAssigner, Cursor, DepKeypair, DepToken, Error, Result, TOKEN_KEY_PREFIX,
};

use crate::storage::{ReadTxExt as _, WriteTxExt as _};
use crate::{Bucket, DepStore, KeyedStore, Storage};

/// Key of the singleton cursor in [`Bucket::DepConfig`].
const CURSOR_KEY: &str = "cursor";

/// Key of the singleton keypair in [`Bucket::DepToken`]; never collides with
/// a consumer key.
const KEYPAIR_KEY: &str = "keypair";

impl<S: KeyedStore> DepStore for Storage<S> {
    fn load_cursor(&self) -> Result<Option<Cursor>> {
        self.record(Bucket::DepConfig, CURSOR_KEY)
    }

    fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.update("save cursor", |tx| {
            tx.put_record(Bucket::DepConfig, CURSOR_KEY, cursor)
        })?;
        tracing::debug!(cursor = %cursor.value, "saved sync cursor");
        Ok(())
    }

    fn save_auto_assigner(&self, assigner: &AutoAssigner) -> Result<()> {
        assigner.verify()?;
        self.update("save auto-assigner", |tx| {
            tx.put_record(Bucket::DepAutoAssign, &assigner.filter, assigner)
        })?;
        tracing::info!(filter = %assigner.filter, profile = %assigner.profile_uuid, "saved auto-assigner");
        Ok(())
    }

    fn delete_auto_assigner(&self, filter: &str) -> Result<()> {
        let existed = self.update("delete auto-assigner", |tx| {
            tx.delete(Bucket::DepAutoAssign, filter)
        })?;
        if existed {
            tracing::info!(filter, "deleted auto-assigner");
        }
        Ok(())
    }

    fn load_auto_assigners(&self) -> Result<Vec<AutoAssigner>> {
        self.records(Bucket::DepAutoAssign)
    }

    fn save_dep_token(&self, token: &DepToken) -> Result<()> {
        if !token.consumer_key.starts_with(TOKEN_KEY_PREFIX) {
            return Err(Error::validation(
                "consumer_key",
                format!("must start with {TOKEN_KEY_PREFIX}"),
            ));
        }
        self.update("save enrollment token", |tx| {
            tx.put_record(Bucket::DepToken, &token.consumer_key, token)
        })
    }

    fn dep_tokens(&self) -> Result<Vec<DepToken>> {
        self.keyed_records(Bucket::DepToken, |key| key.starts_with(TOKEN_KEY_PREFIX))
    }

    fn dep_keypair(&self) -> Result<Option<DepKeypair>> {
        self.record(Bucket::DepToken, KEYPAIR_KEY)
    }

    fn store_dep_keypair_if_absent(&self, candidate: &DepKeypair) -> Result<DepKeypair> {
        self.update("store enrollment keypair", |tx| {
            if let Some(existing) = tx.record::<DepKeypair>(Bucket::DepToken, KEYPAIR_KEY)? {
                return Ok(existing);
            }
            tx.put_record(Bucket::DepToken, KEYPAIR_KEY, candidate)?;
            tracing::info!("stored new enrollment keypair");
            Ok(candidate.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentStore;

    fn storage() -> (tempfile::TempDir, Storage<DocumentStore>) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("mdm.sqlite");
        let kv = DocumentStore::new(url.to_str().unwrap(), 2).unwrap();
        (dir, Storage::new(kv))
    }

    fn token(key: &str) -> DepToken {
        DepToken {
            consumer_key: key.into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_secret: "as".into(),
            access_token_expiry: None,
        }
    }

    #[test]
    fn test_tokens_exclude_keypair() {
        let (_dir, db) = storage();
        db.save_dep_token(&token("CK_one")).unwrap();
        db.store_dep_keypair_if_absent(&DepKeypair {
            key_pem: "pem".into(),
            cert_der: vec![1],
        })
        .unwrap();

        let tokens = db.dep_tokens().unwrap();
        assert_eq!(tokens, vec![token("CK_one")]);
    }

    #[test]
    fn test_token_needs_consumer_key_prefix() {
        let (_dir, db) = storage();
        assert!(db.save_dep_token(&token("one")).is_err());
    }

    #[test]
    fn test_keypair_first_writer_wins() {
        let (_dir, db) = storage();
        assert!(db.dep_keypair().unwrap().is_none());

        let first = DepKeypair {
            key_pem: "first".into(),
            cert_der: vec![1],
        };
        let second = DepKeypair {
            key_pem: "second".into(),
            cert_der: vec![2],
        };
        assert_eq!(db.store_dep_keypair_if_absent(&first).unwrap(), first);
        assert_eq!(db.store_dep_keypair_if_absent(&second).unwrap(), first);
        assert_eq!(db.dep_keypair().unwrap(), Some(first));
    }
}
