//! Server-side Lua primitives.
//!
//! All three scripts are uploaded once per instance via `SCRIPT LOAD` and
//! invoked by digest. Each one folds a read-check-write sequence into a
//! single atomic step on the server, which is what makes the per-server
//! grant safe against concurrent contenders.

/// Sets the key to the token with a millisecond expiry iff the key is
/// absent and new acquisitions are permitted (`ARGV[3] == 'yes'`), or the
/// key already holds this exact token (the extend case). Returns the SET
/// reply on success, nil on the branch not taken.
pub const LOCK: &str = r#"
if (redis.call('exists', KEYS[1]) == 0 and ARGV[3] == 'yes')
    or redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('set', KEYS[1], ARGV[1], 'PX', ARGV[2])
end
"#;

/// Deletes the key only if it still holds this token. A late release from
/// a holder whose lock expired and was reacquired must not disturb the new
/// owner.
pub const UNLOCK: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
else
  return 0
end
"#;

/// Returns `[value, pttl]` in one step so the two reads cannot drift
/// between round trips.
pub const PTTL: &str = r#"
return { redis.call('get', KEYS[1]), redis.call('pttl', KEYS[1]) }
"#;

/// Which of the three primitives to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScriptKind {
    Lock,
    Unlock,
    Pttl,
}

/// SHA-1 digests recorded after upload.
#[derive(Debug, Clone)]
pub(crate) struct ScriptShas {
    pub lock: String,
    pub unlock: String,
    pub pttl: String,
}

impl ScriptShas {
    pub fn sha(&self, kind: ScriptKind) -> &str {
        match kind {
            ScriptKind::Lock => &self.lock,
            ScriptKind::Unlock => &self.unlock,
            ScriptKind::Pttl => &self.pttl,
        }
    }
}
