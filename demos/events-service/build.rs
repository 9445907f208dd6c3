//! Rebuild when migrations change.
//!
//! `embed_migrations!` reads the migration files at compile time, which Cargo
//! cannot track on its own.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
