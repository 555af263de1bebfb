/// Integration tests for the checkpointed sink covering crash recovery,
/// bounded retry, and lineage resets.

mod helpers;
mod recovery;
mod retry;
