//! Cross-crate scenarios: orchestration against the in-memory provider and
//! bypass scans against local listeners.

#[cfg(test)]
mod orchestration;
#[cfg(test)]
mod scanning;
#[cfg(test)]
mod support;
