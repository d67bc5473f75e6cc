//! Helpers for testing code built on patches.
pub mod fixtures {
    use shared::PublicKey;

    use crate::git::Oid;
    use crate::store::MemoryStore;

    /// A deterministic author key.
    pub fn author(seed: u8) -> PublicKey {
        shared::identity::test::public_key(seed)
    }

    /// A linear history `initial <- a <- b` with `c` rewriting `a..b` on top of `initial`.
    pub struct History {
        pub store: MemoryStore,
        pub initial: Oid,
        pub a: Oid,
        pub b: Oid,
        pub c: Oid,
    }

    pub fn history() -> History {
        let store = MemoryStore::new();
        let initial = store.commit("Initial commit", &[]);
        let a = store.commit("Add feature", &[initial]);
        let b = store.commit("Extend feature", &[a]);
        let c = store.commit("Add feature, amended", &[initial]);

        History {
            store,
            initial,
            a,
            b,
            c,
        }
    }
}
