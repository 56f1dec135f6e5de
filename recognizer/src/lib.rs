/* file: src/lib.rs
Landmark-based audio fingerprinting. `recognizer` turns audio into hashes and
scores candidate songs; `db` persists the hash index.
*/

pub mod db;
pub mod recognizer;
