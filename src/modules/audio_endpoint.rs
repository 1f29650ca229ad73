use alsa::mixer::{Mixer, SelemId};
use anyhow::Error;

/// Master-volume surface of the OS audio endpoint.
///
/// The raw volume range is device specific; it is queried once at
/// construction and `set_master_volume` expects a level inside it.
pub trait EndpointVolume {
    fn volume_range(&self) -> (f32, f32);
    fn set_master_volume(&mut self, level: f32) -> Result<(), Error>;
}

/// ALSA implementation bound to one simple mixer control.
pub struct AlsaEndpoint {
    mixer: Mixer,
    selem_id: SelemId,
    range: (i64, i64),
}

impl AlsaEndpoint {
    /// new opens the mixer and resolves the playback control; failure means
    /// the audio endpoint is unavailable and the caller should abort.
    ///
    /// # Arguments
    /// * `card` - ALSA card name, e.g. `default`
    /// * `control` - simple mixer control name, e.g. `Master`
    ///
    /// # Returns
    /// * `Result<AlsaEndpoint, Error>`
    pub fn new(card: &str, control: &str) -> Result<Self, Error> {
        let mixer = Mixer::new(card, false)?;
        let selem_id = SelemId::new(control, 0);
        let range = match mixer.find_selem(&selem_id) {
            None => {
                return Err(Error::msg(format!(
                    "audio_endpoint - mixer control {} not found on card {}",
                    control, card
                )))
            }
            Some(selem) => selem.get_playback_volume_range(),
        };
        Ok(AlsaEndpoint {
            mixer,
            selem_id,
            range,
        })
    }
}

impl EndpointVolume for AlsaEndpoint {
    fn volume_range(&self) -> (f32, f32) {
        (self.range.0 as f32, self.range.1 as f32)
    }

    fn set_master_volume(&mut self, level: f32) -> Result<(), Error> {
        let selem = match self.mixer.find_selem(&self.selem_id) {
            None => return Err(Error::msg("audio_endpoint - mixer control disappeared")),
            Some(selem) => selem,
        };
        selem.set_playback_volume_all(level.round() as i64)?;
        Ok(())
    }
}
