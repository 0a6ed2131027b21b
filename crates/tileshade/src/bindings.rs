use shading::{BindingValue, ChannelBinding, ConstantImage, Format};
use tileconfig::{ChannelSpec, ChannelValueSpec, FormatSize, InputSection};

pub fn channel_binding_from_spec(spec: &ChannelSpec) -> ChannelBinding {
    let value = match &spec.value {
        ChannelValueSpec::Float(value) => BindingValue::Float(*value),
        ChannelValueSpec::Color(color) => BindingValue::Color3(*color),
        ChannelValueSpec::Closure(network) => BindingValue::Closure(network.clone()),
        ChannelValueSpec::Int(value) => BindingValue::Int(*value),
        ChannelValueSpec::String(text) => BindingValue::Text(text.clone()),
        ChannelValueSpec::Vector2(value) => BindingValue::Vector2(*value),
    };

    let binding = ChannelBinding::new(spec.name.clone(), value);
    match spec.enabled {
        Some(enabled) => binding.with_enabled(enabled),
        None => binding,
    }
}

/// Sizes are validated to fit in `i32` when the config is loaded.
pub fn format_from_size(size: FormatSize) -> Format {
    Format::new(
        i32::try_from(size.width).unwrap_or(i32::MAX),
        i32::try_from(size.height).unwrap_or(i32::MAX),
    )
}

pub fn input_image(input: &InputSection) -> ConstantImage {
    let mut image = ConstantImage::new(format_from_size(input.format));
    for (name, value) in &input.channels {
        image = image.with_channel(name.clone(), *value);
    }
    if let Some(samples) = input.deep_samples {
        if samples == 0 {
            tracing::warn!("input.deep_samples is zero; every deep pixel will be empty");
        }
        image = image.with_deep_samples(samples);
    }
    image
}
