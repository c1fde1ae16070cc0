/// Portal-facing data retrieval.
///
/// Submodules:
/// - `portal` — Itron portal API: URL construction, JSON parsing, and the
///   windowed `ReadingFetcher`.
/// - `fixtures` (test only) — representative portal response payloads.
///
/// Should another hosting vendor ever appear, it gets its own file here
/// behind the same `MunicipalityProfile` parse capability rather than
/// bloating `portal`.

pub mod portal;

#[cfg(test)]
pub(crate) mod fixtures;
