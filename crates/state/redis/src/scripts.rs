/// Lua script for atomic check-and-set (set-if-not-exists).
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = value to set
///
/// Returns 1 if the key was newly set, 0 if it already existed.
pub const CHECK_AND_SET: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'ver', 1)
return 1
";

/// Lua script for an unconditional write that bumps the version.
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = value to set
///
/// Returns the new version.
pub const SET: &str = r"
local new_ver = redis.call('HINCRBY', KEYS[1], 'ver', 1)
redis.call('HSET', KEYS[1], 'v', ARGV[1])
return new_ver
";

/// Lua script deleting a key only at the expected version.
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = expected version
///
/// Returns 1 if the key was deleted, 0 otherwise.
pub const DELETE_IF_VERSION: &str = r"
local cur_ver = redis.call('HGET', KEYS[1], 'ver')
if not cur_ver or tonumber(cur_ver) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
";

/// Lua script for atomic compare-and-swap using a hash with `v` (value) and
/// `ver` (version) fields.
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = expected version
/// ARGV\[2\] = new value
///
/// Returns:
///   - `[1, new_ver]` on success
///   - `[0, cur_ver, cur_val]` on conflict
///   - `[1, 1]` if key does not exist and expected version is 0
pub const COMPARE_AND_SWAP: &str = r"
local exists = redis.call('EXISTS', KEYS[1])
local expected = tonumber(ARGV[1])
if exists == 0 then
    if expected ~= 0 then
        return {0, 0, false}
    end
    redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', 1)
    return {1, 1}
end
local cur_ver = tonumber(redis.call('HGET', KEYS[1], 'ver'))
if cur_ver ~= expected then
    local cur_val = redis.call('HGET', KEYS[1], 'v')
    return {0, cur_ver, cur_val}
end
local new_ver = cur_ver + 1
redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', new_ver)
return {1, new_ver}
";
