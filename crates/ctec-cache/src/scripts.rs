//! Server-side Lua scripts.
//!
//! Script bodies are versioned constants. They are registered with `SCRIPT LOAD` when
//! the store connects and invoked by SHA1 afterwards. If the server answers `NOSCRIPT`
//! (restart, `SCRIPT FLUSH`, failover) the full body is submitted once with `EVAL`,
//! which also re-caches it server-side, and later calls take the SHA1 path again.

use deadpool_redis::Connection;
use redis::{ErrorKind, FromRedisValue, RedisResult};

/// A Lua script and the version of its contract.
#[derive(Debug, Clone, Copy)]
pub struct ScriptDef {
    pub name: &'static str,
    pub version: u32,
    /// Read-only scripts are invoked with `EVALSHA_RO` / `EVAL_RO`.
    pub read_only: bool,
    pub body: &'static str,
}

/// `KEYS[1]` TagIndex hash. `ARGV[1]` tag, `ARGV[2]` entry key.
///
/// Resolves the tag to its location and reads the entry key there.
pub const GET_BY_TAG: ScriptDef = ScriptDef {
    name: "get_by_tag",
    version: 2,
    read_only: true,
    body: r#"
local pointer = redis.call('HGET', KEYS[1], ARGV[1])
if not pointer then return false end
local sep = string.find(pointer, '\31', 1, true)
if not sep then return false end
return redis.call('HGET', string.sub(pointer, 1, sep - 1), ARGV[2])
"#,
};

/// `KEYS[1]` TagIndex hash, `KEYS[2..]` TableIndex sets. `ARGV` tags.
///
/// Deletes each tagged entry and its TagIndex field, then every composite location
/// listed in the given TableIndex sets along with the sets themselves. Returns the
/// number of keys passed to `DEL`.
pub const INVALIDATE: ScriptDef = ScriptDef {
    name: "invalidate",
    version: 2,
    read_only: false,
    body: r#"
local tags_map = KEYS[1]
for _, tag in ipairs(ARGV) do
  local pointer = redis.call('HGET', tags_map, tag)
  if pointer then
    local sep = string.find(pointer, '\31', 1, true)
    if sep then
      redis.call('HDEL', string.sub(pointer, 1, sep - 1), string.sub(pointer, sep + 1))
    end
  end
  redis.call('HDEL', tags_map, tag)
end
local doomed = {}
for i = 2, #KEYS do
  for _, location in ipairs(redis.call('SMEMBERS', KEYS[i])) do
    doomed[#doomed + 1] = location
  end
  doomed[#doomed + 1] = KEYS[i]
end
for i = 1, #doomed, 512 do
  redis.call('DEL', unpack(doomed, i, math.min(i + 511, #doomed)))
end
return #doomed
"#,
};

/// Every script registered on connect.
pub const ALL: [ScriptDef; 2] = [GET_BY_TAG, INVALIDATE];

/// A script together with its SHA1 digest.
#[derive(Debug, Clone)]
pub struct RegisteredScript {
    def: ScriptDef,
    sha: String,
}

impl RegisteredScript {
    pub fn new(def: ScriptDef) -> Self {
        let sha = redis::Script::new(def.body).get_hash().to_string();
        Self { def, sha }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    /// Upload the body so later `EVALSHA` calls hit the server's script cache.
    pub async fn load(&self, conn: &mut Connection) -> RedisResult<()> {
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(self.def.body)
            .query_async(conn)
            .await?;
        if sha != self.sha {
            tracing::warn!(
                script = self.def.name,
                expected = %self.sha,
                actual = %sha,
                "Script digest mismatch"
            );
        }
        tracing::debug!(
            script = self.def.name,
            version = self.def.version,
            sha = %sha,
            "Script registered"
        );
        Ok(())
    }

    /// Run the script by digest, falling back to the full body on `NOSCRIPT`.
    pub async fn invoke<T: FromRedisValue>(
        &self,
        conn: &mut Connection,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<T> {
        let (by_sha, by_body) = if self.def.read_only {
            ("EVALSHA_RO", "EVAL_RO")
        } else {
            ("EVALSHA", "EVAL")
        };

        let fast = redis::cmd(by_sha)
            .arg(&self.sha)
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(conn)
            .await;

        match fast {
            Err(e) if e.kind() == ErrorKind::NoScriptError => {
                tracing::debug!(
                    script = self.def.name,
                    "Script not cached by server, sending body"
                );
                redis::cmd(by_body)
                    .arg(self.def.body)
                    .arg(keys.len())
                    .arg(keys)
                    .arg(args)
                    .query_async(conn)
                    .await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let a = RegisteredScript::new(INVALIDATE);
        let b = RegisteredScript::new(INVALIDATE);
        assert_eq!(a.sha(), b.sha());
        assert_eq!(a.sha().len(), 40);
        assert_ne!(a.sha(), RegisteredScript::new(GET_BY_TAG).sha());
    }

    #[test]
    fn test_scripts_use_pointer_separator() {
        // '\31' in Lua is the same unit separator the Rust side writes.
        assert_eq!(crate::key::POINTER_SEPARATOR as u32, 31);
        for def in ALL {
            assert!(def.body.contains(r"'\31'"), "{} must split pointers", def.name);
        }
    }
}
