/// Integration tests for the bronze layer covering finite and continuous
/// consumption, enrichment, record rejection, and count validation.

mod consume;
mod continuous;
mod helpers;
mod validation;
