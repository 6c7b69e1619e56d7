use crate::error::DispatchError;
use crate::geo;
use crate::model::{Candidate, Capability};
use crate::registry::ResponderDirectory;

/// On-duty responders of `capability`, nearest first.
///
/// An empty result means no unit is available; it is not an error. Ties keep
/// registry order.
pub fn select_responders(
    directory: &dyn ResponderDirectory,
    capability: Capability,
    location: &str,
) -> Result<Vec<Candidate>, DispatchError> {
    let target = directory
        .location(location)
        .ok_or_else(|| DispatchError::UnknownLocation(location.to_string()))?;

    let mut candidates = directory
        .responders()
        .iter()
        .filter(|r| r.on_duty && r.capability == capability)
        .map(|r| {
            let distance_m = geo::distance_m(r.position, target);
            Candidate {
                responder: r.clone(),
                distance_m,
                distance: geo::format_distance(distance_m),
            }
        })
        .collect::<Vec<_>>();

    candidates.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    Ok(candidates)
}
