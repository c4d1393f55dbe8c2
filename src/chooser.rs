//! Pluggable selection of one capability set out of the enumerated ones.

use crate::config::Capabilities;

/// A policy choosing one configuration from the platform's candidate list.
///
/// The chooser runs synchronously during surface configuration, possibly
/// while the native surface handle is locked, so implementations must be
/// side-effect free and must not call back into negotiation.
///
/// The returned value must be an index into `available`. Anything out of
/// range is treated by the negotiation layer as a fatal contract violation,
/// see [`ErrorKind::BadChooserIndex`].
///
/// [`ErrorKind::BadChooserIndex`]: crate::error::ErrorKind::BadChooserIndex
pub trait CapabilitiesChooser: std::fmt::Debug {
    /// Choose the index of the capabilities to use.
    ///
    /// `recommended` carries the platform's own suggestion as an index into
    /// `available`, when the platform produced one.
    fn choose(
        &self,
        requested: &Capabilities,
        available: &[Capabilities],
        recommended: Option<usize>,
    ) -> usize;
}

/// The default capability selection policy.
///
/// The platform recommendation is honored when it does not contradict the
/// hard parts of the request (double buffering, stereo, float pixels).
/// Otherwise every candidate is given a mismatch score and the lowest score
/// wins, with ties resolved to the lowest index. Color depth differences
/// dominate the score, followed by missing depth/stencil, buffering flags
/// and sample count distance.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCapabilitiesChooser;

/// A candidate that can never satisfy the request, kept comparable so the
/// chooser still returns an in-range index when nothing fits.
const DISQUALIFIED: u32 = u32::MAX;

impl CapabilitiesChooser for DefaultCapabilitiesChooser {
    fn choose(
        &self,
        requested: &Capabilities,
        available: &[Capabilities],
        recommended: Option<usize>,
    ) -> usize {
        if let Some(recommended) = recommended {
            if recommended < available.len()
                && hard_requests_met(requested, &available[recommended])
            {
                return recommended;
            }
        }

        let mut best = 0;
        let mut best_score = DISQUALIFIED;
        for (index, candidate) in available.iter().enumerate() {
            let score = score(requested, candidate);
            if score < best_score {
                best = index;
                best_score = score;
            }
        }

        best
    }
}

fn hard_requests_met(requested: &Capabilities, candidate: &Capabilities) -> bool {
    candidate.double_buffer == requested.double_buffer
        && candidate.stereo == requested.stereo
        && candidate.float_pixels == requested.float_pixels
}

fn score(requested: &Capabilities, candidate: &Capabilities) -> u32 {
    if candidate.float_pixels != requested.float_pixels {
        return DISQUALIFIED;
    }

    let diff = |a: u8, b: u8| a.abs_diff(b) as u32;

    let mut score = 0;

    score += 8
        * (diff(candidate.red_size, requested.red_size)
            + diff(candidate.green_size, requested.green_size)
            + diff(candidate.blue_size, requested.blue_size)
            + diff(candidate.alpha_size, requested.alpha_size));

    if requested.depth_size > 0 && candidate.depth_size == 0 {
        score += 50;
    } else {
        score += 4 * diff(candidate.depth_size, requested.depth_size);
    }

    if requested.stencil_size > 0 && candidate.stencil_size == 0 {
        score += 50;
    } else {
        score += 2 * diff(candidate.stencil_size, requested.stencil_size);
    }

    score += diff(candidate.accum_red_size, requested.accum_red_size)
        + diff(candidate.accum_green_size, requested.accum_green_size)
        + diff(candidate.accum_blue_size, requested.accum_blue_size)
        + diff(candidate.accum_alpha_size, requested.accum_alpha_size);

    if candidate.double_buffer != requested.double_buffer {
        score += 100;
    }
    if candidate.stereo != requested.stereo {
        score += 100;
    }

    match (requested.num_samples, candidate.num_samples) {
        (Some(_), None) => score += 60,
        (Some(wanted), Some(got)) => score += 4 * diff(got, wanted),
        // An unrequested multisample buffer wastes memory and fill rate.
        (None, Some(_)) => score += 20,
        (None, None) => (),
    }

    if let Some(accelerated) = requested.hardware_accelerated {
        if candidate.hardware_accelerated != Some(accelerated) {
            score += 80;
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilitiesBuilder;

    fn caps(depth: u8, stencil: u8, double_buffer: bool, samples: Option<u8>) -> Capabilities {
        let mut builder = CapabilitiesBuilder::new()
            .with_depth_size(depth)
            .with_stencil_size(stencil)
            .with_double_buffer(double_buffer);
        if let Some(samples) = samples {
            builder = builder.with_multisampling(samples);
        }
        builder.build()
    }

    #[test]
    fn recommendation_is_honored() {
        let requested = caps(24, 8, true, None);
        let available =
            vec![caps(16, 0, true, None), caps(24, 8, false, None), caps(24, 8, true, None)];

        let chosen = DefaultCapabilitiesChooser.choose(&requested, &available, Some(2));
        assert_eq!(chosen, 2);
        assert_eq!(available[chosen].depth_size(), 24);
        assert_eq!(available[chosen].stencil_size(), 8);
        assert!(available[chosen].double_buffer());
    }

    #[test]
    fn recommendation_violating_buffering_is_rescored() {
        let requested = caps(24, 8, true, None);
        let available = vec![caps(24, 8, false, None), caps(24, 8, true, None)];

        // Index 0 is single buffered; the request is not.
        let chosen = DefaultCapabilitiesChooser.choose(&requested, &available, Some(0));
        assert_eq!(chosen, 1);
    }

    #[test]
    fn out_of_range_recommendation_is_ignored() {
        let requested = caps(24, 8, true, None);
        let available = vec![caps(24, 8, true, None)];

        let chosen = DefaultCapabilitiesChooser.choose(&requested, &available, Some(17));
        assert_eq!(chosen, 0);
    }

    #[test]
    fn exact_match_wins_scoring() {
        let requested = caps(24, 8, true, Some(4));
        let available = vec![
            caps(24, 8, true, None),
            caps(24, 8, true, Some(16)),
            caps(24, 8, true, Some(4)),
            caps(32, 8, true, Some(4)),
        ];

        let chosen = DefaultCapabilitiesChooser.choose(&requested, &available, None);
        assert_eq!(chosen, 2);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let requested = caps(24, 8, true, None);
        let available = vec![caps(24, 8, true, None), caps(24, 8, true, None)];

        let chosen = DefaultCapabilitiesChooser.choose(&requested, &available, None);
        assert_eq!(chosen, 0);
    }
}
