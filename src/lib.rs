#![doc = "Areal apportionment: redistribute quantities measured on one partition of a city onto another"]
mod apportion;
mod correct;
mod geometry;
mod overlap;

#[doc(inline)]
pub use geometry::{Zone, ZoneSet};

#[doc(inline)]
pub use overlap::{Candidates, OverlapCell, OverlapMatrix, QualityWarning};

#[doc(inline)]
pub use correct::{CorrectedMatrix, correct_coverage};

#[doc(inline)]
pub use apportion::{ApportionedResult, QuantityTable, apportion};
