//! Sovereign authorities and realms.
//!
//! An [`Authority`] owns its signing keys. Its public face is an
//! [`AuthorityRoot`], which carries a self-issued authority seal over the
//! canonical descriptor so it can be shared and checked offline.
//!
//! Authorities are always built explicitly and passed to whatever needs them;
//! there is no process-wide root.

use crate::model::{
    EntityKind, Identity, Lineage, Metric, Policy, SealEnvelope, TrustObject, TrustVersion,
};
use crate::seal::seal;
use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, KernelError, Result, Timestamp};
use sovereign_crypto::hash::hex_bytes;
use sovereign_crypto::{
    hash_parts, to_hex, verify_classical, AuthorityKey, PqPublicKey, PqSigner,
    SecondaryEd25519Signer,
};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Length of an authority id in hex characters.
const AUTHORITY_ID_LEN: usize = 48;

/// Public descriptor of an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRoot {
    pub id: String,
    pub name: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pq_public_key: Option<PqPublicKey>,
    pub pq_enabled: bool,
    pub lineage: Lineage,
    pub created_at: Timestamp,
    #[serde(with = "hex_bytes")]
    pub authority_seal: Vec<u8>,
}

#[derive(Serialize)]
struct RootDescriptor<'a> {
    id: &'a str,
    name: &'a str,
    public_key: String,
    pq_public_key: Option<&'a PqPublicKey>,
    pq_enabled: bool,
    lineage: &'a Lineage,
    created_at: Timestamp,
}

fn descriptor_bytes(
    id: &str,
    name: &str,
    public_key: &[u8],
    pq_public_key: Option<&PqPublicKey>,
    pq_enabled: bool,
    lineage: &Lineage,
    created_at: Timestamp,
) -> Result<Vec<u8>> {
    let descriptor = RootDescriptor {
        id,
        name,
        public_key: hex::encode(public_key),
        pq_public_key,
        pq_enabled,
        lineage,
        created_at,
    };
    serde_json::to_vec(&descriptor).map_err(|e| KernelError::malformed("authority", e.to_string()))
}

fn authority_id(public_key: &[u8], created_at: Timestamp, name: &str) -> String {
    let created_at = created_at.to_le_bytes();
    let digest = hash_parts([public_key, &created_at[..], name.as_bytes()]);
    let mut id = to_hex(&digest);
    id.truncate(AUTHORITY_ID_LEN);
    id
}

impl AuthorityRoot {
    /// Check the authority seal and that the descriptor is self-consistent.
    pub fn verify_seal(&self) -> bool {
        if self.lineage.derived_root != self.id || !self.lineage.is_well_formed() {
            warn!(authority = %self.id, "Authority lineage does not match its id");
            return false;
        }
        if self.pq_enabled != self.pq_public_key.is_some() {
            warn!(authority = %self.id, "Authority PQ flag disagrees with its keys");
            return false;
        }
        let Ok(payload) = descriptor_bytes(
            &self.id,
            &self.name,
            &self.public_key,
            self.pq_public_key.as_ref(),
            self.pq_enabled,
            &self.lineage,
            self.created_at,
        ) else {
            return false;
        };
        match verify_classical(&payload, &self.authority_seal, &self.public_key) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(authority = %self.id, error = %e, "Authority public key rejected");
                false
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.lineage.depth()
    }
}

/// Parameters for issuing a new trust object.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub kind: EntityKind,
    pub policy: Policy,
    pub metric: Option<Metric>,
    pub expires_at: Option<Timestamp>,
    /// Generated as `did:sov:<uuid>` when absent
    pub subject_id: Option<String>,
}

impl IssueRequest {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            policy: Policy::default(),
            metric: None,
            expires_at: None,
            subject_id: None,
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn expires_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn subject_id(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }
}

/// An authority holding its private keys.
#[derive(Clone)]
pub struct Authority {
    key: AuthorityKey,
    pq_signer: Option<Arc<dyn PqSigner>>,
    root: AuthorityRoot,
}

impl Authority {
    /// Generate a new sovereign root with fresh keys.
    pub fn generate(name: impl Into<String>, pq_enabled: bool) -> Result<Self> {
        Self::from_keys(
            name,
            AuthorityKey::generate(),
            fresh_pq_signer(pq_enabled),
            current_timestamp_ms(),
        )
    }

    /// Build a root authority from existing keys.
    pub fn from_keys(
        name: impl Into<String>,
        key: AuthorityKey,
        pq_signer: Option<Arc<dyn PqSigner>>,
        created_at: Timestamp,
    ) -> Result<Self> {
        let name = name.into();
        let id = authority_id(&key.public_key(), created_at, &name);
        let lineage = Lineage::genesis(id, "root-origin", created_at);
        Self::assemble(name, key, pq_signer, lineage, created_at)
    }

    /// Derive a secondary realm whose lineage descends from `parent`.
    pub fn derive_realm(parent: &Authority, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let key = AuthorityKey::generate();
        let created_at = current_timestamp_ms();
        let id = authority_id(&key.public_key(), created_at, &name);

        let mut lineage = parent.root.lineage.clone();
        lineage.rotate(id, "sovereign-derived", created_at)?;

        let realm = Self::assemble(
            name,
            key,
            fresh_pq_signer(parent.pq_enabled()),
            lineage,
            created_at,
        )?;
        info!(realm = %realm.id(), parent = %parent.id(), "Realm authority derived");
        Ok(realm)
    }

    /// Restore an authority whose lineage was persisted elsewhere.
    pub fn with_lineage(self, lineage: Lineage) -> Result<Self> {
        if lineage.derived_root != self.root.id {
            return Err(KernelError::malformed(
                "lineage.derived_root",
                "does not match the authority id",
            ));
        }
        lineage.check()?;
        let Authority {
            key,
            pq_signer,
            root,
        } = self;
        Self::assemble(root.name, key, pq_signer, lineage, root.created_at)
    }

    fn assemble(
        name: String,
        key: AuthorityKey,
        pq_signer: Option<Arc<dyn PqSigner>>,
        lineage: Lineage,
        created_at: Timestamp,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(KernelError::malformed("authority.name", "must not be empty"));
        }
        let public_key = key.public_key();
        let pq_public_key = pq_signer.as_ref().map(|pq| pq.public_key());
        let pq_enabled = pq_public_key.is_some();
        let id = lineage.derived_root.clone();

        let payload = descriptor_bytes(
            &id,
            &name,
            &public_key,
            pq_public_key.as_ref(),
            pq_enabled,
            &lineage,
            created_at,
        )?;
        let authority_seal = key.sign(&payload);

        Ok(Self {
            key,
            pq_signer,
            root: AuthorityRoot {
                id,
                name,
                public_key,
                pq_public_key,
                pq_enabled,
                lineage,
                created_at,
                authority_seal,
            },
        })
    }

    pub fn id(&self) -> &str {
        &self.root.id
    }

    pub fn name(&self) -> &str {
        &self.root.name
    }

    pub fn root(&self) -> &AuthorityRoot {
        &self.root
    }

    pub fn lineage(&self) -> &Lineage {
        &self.root.lineage
    }

    pub fn pq_enabled(&self) -> bool {
        self.root.pq_enabled
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key.public_key()
    }

    pub(crate) fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.key.sign(payload)
    }

    fn pq_signer(&self) -> Option<&dyn PqSigner> {
        self.pq_signer.as_deref()
    }

    /// Create and seal a trust object owned by this authority.
    pub fn issue(&self, request: IssueRequest) -> Result<TrustObject> {
        let now = current_timestamp_ms();
        let id = request
            .subject_id
            .unwrap_or_else(|| format!("did:sov:{}", Uuid::new_v4()));

        let trust = TrustObject {
            version: TrustVersion::for_pq(self.pq_enabled()),
            identity: Identity {
                id,
                kind: request.kind,
                authority_root: self.root.id.clone(),
                created_at: now,
                public_key: self.key.public_key(),
                pq_public_key: self.root.pq_public_key.clone(),
            },
            policy: request.policy,
            lineage: self.root.lineage.clone(),
            seal: SealEnvelope::unsealed(request.expires_at),
            metric: request.metric,
        };

        let sealed = seal(trust, &self.key, self.pq_signer())?;
        info!(identity = %sealed.identity.id, authority = %self.root.id, "Trust object issued");
        Ok(sealed)
    }

    /// Take ownership of `object` and re-seal it under this authority.
    pub fn renew(&self, mut object: TrustObject) -> Result<TrustObject> {
        let now = current_timestamp_ms();
        if object.lineage.derived_root != self.root.id {
            object.lineage.rotate(self.root.id.clone(), "renewal", now)?;
        }
        object.version = TrustVersion::for_pq(self.pq_enabled());
        object.identity.authority_root = self.root.id.clone();
        object.identity.public_key = self.key.public_key();
        object.identity.pq_public_key = self.root.pq_public_key.clone();

        let renewed = seal(object, &self.key, self.pq_signer())?;
        info!(identity = %renewed.identity.id, authority = %self.root.id, "Trust object renewed");
        Ok(renewed)
    }

    /// Rotate to fresh keys, keeping the previous id as an ancestor.
    pub fn rotate(self, reason: impl Into<String>) -> Result<Self> {
        let pq_signer = fresh_pq_signer(self.pq_enabled());
        self.rotate_to(AuthorityKey::generate(), pq_signer, reason)
    }

    /// Rotate to the given keys.
    pub fn rotate_to(
        self,
        key: AuthorityKey,
        pq_signer: Option<Arc<dyn PqSigner>>,
        reason: impl Into<String>,
    ) -> Result<Self> {
        let created_at = current_timestamp_ms();
        let name = self.root.name;
        let previous = self.root.id;
        let id = authority_id(&key.public_key(), created_at, &name);

        let mut lineage = self.root.lineage;
        lineage.rotate(id, reason, created_at)?;

        let rotated = Self::assemble(name, key, pq_signer, lineage, created_at)?;
        info!(authority = %rotated.id(), previous = %previous, "Authority rotated");
        Ok(rotated)
    }
}

fn fresh_pq_signer(pq_enabled: bool) -> Option<Arc<dyn PqSigner>> {
    pq_enabled.then(|| Arc::new(SecondaryEd25519Signer::generate()) as Arc<dyn PqSigner>)
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("id", &self.root.id)
            .field("name", &self.root.name)
            .field("key_id", &self.key.key_id())
            .field("pq_enabled", &self.root.pq_enabled)
            .finish_non_exhaustive()
    }
}
