//! File service: upload, read, list, delete, sign and verify.

use keyward_core::{sign_document, verify_signed, FileId, KeyTable, SignatureMetadata, UserId};
use keyward_perms::TransportKey;
use keyward_store::{
    blob_name, BlobStore, FilePermissionRecord, FileRecord, KeyStore, Repository, StoreError,
};
use tracing::{debug, info, warn};

use crate::error::{Result, VaultError};
use crate::mail::Mailer;
use crate::vault::Vault;

/// A decrypted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub file: FileRecord,
    pub content: Vec<u8>,
}

/// One entry of a file listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListing {
    pub file: FileRecord,
    /// The requester's grant on this file, when listing someone else's files.
    pub grant: Option<FilePermissionRecord>,
}

impl<K, R, B, M> Vault<K, R, B, M>
where
    K: KeyStore,
    R: Repository,
    B: BlobStore,
    M: Mailer,
{
    /// Encrypt and store a new file for `owner`.
    pub async fn upload_file(
        &self,
        owner: UserId,
        filename: &str,
        file_type: &str,
        content: &[u8],
    ) -> Result<FileRecord> {
        if filename.trim().is_empty() {
            return Err(VaultError::InvalidInput("filename is empty".into()));
        }
        let owner = self.user(owner).await?;

        let (ciphertext, key_reference) = self.store_encrypted(owner.id, content).await?;
        let storage_path = self.blob_path(&blob_name());
        self.blobs.write(&storage_path, &ciphertext).await?;

        let file = self
            .repo
            .insert_file(FileRecord {
                id: FileId(0),
                owner_id: owner.id,
                filename: filename.to_string(),
                file_type: file_type.to_string(),
                storage_path,
                key_reference,
                is_signed: false,
            })
            .await?;

        info!(file = %file.id, owner = %owner.id, size = content.len(), "uploaded file");
        Ok(file)
    }

    /// Read a file as `requester`.
    ///
    /// The owner reads with the file key. Anyone else needs a file grant and
    /// reads their shared copy with the pair's share key.
    pub async fn get_file(&self, requester: UserId, file_id: FileId) -> Result<FileContent> {
        let file = self.file(file_id).await?;

        if file.owner_id == requester {
            let ciphertext = self.blobs.read(&file.storage_path).await?;
            let content = self.fetch_decrypted(&file.key_reference, &ciphertext).await?;
            debug!(file = %file.id, "owner read");
            return Ok(FileContent { file, content });
        }

        let (permission, grant) = self
            .file_grant(requester, &file)
            .await?
            .ok_or_else(|| {
                warn!(%requester, file = %file.id, "read without grant");
                VaultError::Unauthorized(format!("no grant on file {}", file.id))
            })?;
        let share = self.stored_share_key(&permission).await?;
        let copy = self.blobs.read(&grant.filepath).await?;
        let content = share.open(&self.guard, &copy)?;
        debug!(file = %file.id, %requester, "capability read");
        Ok(FileContent { file, content })
    }

    /// Decrypt a shared copy with the key the requester was sent.
    pub async fn open_shared_file(
        &self,
        requester: UserId,
        file_id: FileId,
        presented: &TransportKey,
    ) -> Result<FileContent> {
        let file = self.file(file_id).await?;
        let reader = self.user(requester).await?;
        let owner = self.user(file.owner_id).await?;

        let share = self.presented_share_key(&reader, &owner, presented).await?;
        let (_, grant) = self
            .file_grant(requester, &file)
            .await?
            .ok_or_else(|| VaultError::Unauthorized(format!("no grant on file {}", file.id)))?;

        let copy = self.blobs.read(&grant.filepath).await?;
        let content = share.open(&self.guard, &copy)?;
        Ok(FileContent { file, content })
    }

    /// List the files of `target_username`, optionally of one type.
    pub async fn list_files(
        &self,
        requester: UserId,
        target_username: &str,
        file_type: Option<&str>,
    ) -> Result<Vec<FileListing>> {
        let target = self.user_by_name(target_username).await?;
        let files = self.repo.list_files(target.id, file_type).await?;

        if target.id == requester {
            return Ok(files
                .into_iter()
                .map(|file| FileListing { file, grant: None })
                .collect());
        }

        let grants = match self.repo.find_permission(requester, target.id).await? {
            Some(permission) => self.repo.list_file_permissions(permission.id).await?,
            None => Vec::new(),
        };
        Ok(files
            .into_iter()
            .map(|file| {
                let grant = grants.iter().find(|g| g.file_id == file.id).cloned();
                FileListing { file, grant }
            })
            .collect())
    }

    /// Delete a file and its ciphertext. Only the owner may delete.
    ///
    /// The file key stays in the key store.
    pub async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<()> {
        let file = self.file(file_id).await?;
        if file.owner_id != owner {
            warn!(%owner, file = %file.id, "delete by non-owner");
            return Err(VaultError::Unauthorized(format!("not the owner of file {}", file.id)));
        }

        match self.blobs.remove(&file.storage_path).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                warn!(file = %file.id, path = %file.storage_path, "ciphertext already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.repo.delete_file(file.id).await?;

        info!(file = %file.id, %owner, "deleted file");
        Ok(())
    }

    /// Sign a file with the owner's RSA key.
    ///
    /// The trailer is appended to the plaintext, which is re-encrypted under
    /// the file's existing key. A file can be signed once.
    pub async fn sign_file(&self, owner: UserId, file_id: FileId) -> Result<FileRecord> {
        let mut file = self.file(file_id).await?;
        if file.owner_id != owner {
            warn!(%owner, file = %file.id, "sign by non-owner");
            return Err(VaultError::Unauthorized(format!("not the owner of file {}", file.id)));
        }
        if file.is_signed {
            return Err(VaultError::StateConflict(format!("file {} is already signed", file.id)));
        }

        let signer = self.user(owner).await?;
        let key = self.resolve(KeyTable::File, &file.key_reference).await?;
        let ciphertext = self.blobs.read(&file.storage_path).await?;
        let document = self.guard.decrypt(&key, &ciphertext)?;

        // Trailer from an earlier attempt whose flag update failed.
        if matches!(verify_signed(&document), Ok(ref m) if m.signed_by == signer.username) {
            self.repo.mark_signed(file.id).await?;
            file.is_signed = true;
            info!(file = %file.id, signer = %signer.username, "recorded existing signature");
            return Ok(file);
        }

        let metadata = SignatureMetadata::new(signer.username.clone(), self.contact(&signer).await?);
        let private_key = self.private_key(&signer).await?;
        let signed = sign_document(&document, &metadata, &private_key, &signer.public_key_pem)?;

        let sealed = self.guard.encrypt(&key, &signed)?;
        self.blobs.write(&file.storage_path, &sealed).await?;
        if let Err(e) = self.repo.mark_signed(file.id).await {
            warn!(file = %file.id, error = %e, "signature written but not recorded");
            return Err(VaultError::SignatureUnrecorded {
                file: file.id,
                source: Box::new(e.into()),
            });
        }
        file.is_signed = true;

        info!(file = %file.id, signer = %signer.username, "signed file");
        Ok(file)
    }

    /// Verify the signature trailer of a file readable by `requester`.
    pub async fn verify_file(&self, requester: UserId, file_id: FileId) -> Result<SignatureMetadata> {
        let opened = self.get_file(requester, file_id).await?;
        let metadata = verify_signed(&opened.content)?;
        debug!(file = %file_id, signer = %metadata.signed_by, "verified signature");
        Ok(metadata)
    }

    pub(crate) async fn file(&self, id: FileId) -> Result<FileRecord> {
        self.repo
            .get_file(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {}", id)))
    }
}
