//! UVCAST gift-wrapping geometry.
//!
//! After a vehicle receives the emergency packet and offers it onward, it
//! decides whether it sits on the edge of its connected cluster. Edge
//! vehicles take store-carry-forward duty; interior vehicles drop it. The
//! test is angular: if the neighbours fill a half-plane or more around the
//! vehicle (relative to the delivery direction), the vehicle is interior.

/// Angular span, in degrees, beyond which a vehicle counts as interior.
const HALF_PLANE_DEG: f64 = 180.0;

/// Per-neighbour angle deltas in degrees, normalised into [−180, 180].
///
/// The reference is the delivery direction `parent → self`; each neighbour
/// contributes the angle `self → neighbour` measured against it.
pub fn neighbor_angle_deltas(
    parent: (f64, f64),
    this: (f64, f64),
    neighbors: &[(f64, f64)],
) -> Vec<f64> {
    let reference = (this.1 - parent.1).atan2(this.0 - parent.0).to_degrees();
    neighbors
        .iter()
        .map(|&(nx, ny)| {
            let angle = (ny - this.1).atan2(nx - this.0).to_degrees();
            let mut delta = reference - angle;
            if delta > 180.0 {
                delta -= 360.0;
            } else if delta < -180.0 {
                delta += 360.0;
            }
            delta
        })
        .collect()
}

/// Gift-wrapping verdict: true when the vehicle is a cluster edge and must
/// carry the packet forward.
///
/// The span is taken over the deltas together with 0 (the delivery
/// direction itself). A span covering the half-plane or more means the
/// cluster continues around the vehicle.
pub fn scf_duty(deltas: &[f64]) -> bool {
    let mut min = 0.0f64;
    let mut max = 0.0f64;
    for &d in deltas {
        if d < min {
            min = d;
        }
        if d > max {
            max = d;
        }
    }
    max - min < HALF_PLANE_DEG
}
