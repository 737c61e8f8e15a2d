use strata_nbt::NbtValue;
use strata_protocol_core::{InternalPacket, RegistryEntry};

/// Build the registry data packets pushed during Configuration.
///
/// A 1.21.1 client refuses to join without these registries; the entry
/// sets below are the minimal contents it accepts. The contents are data,
/// not behaviour: a fuller data source can extend them without touching
/// the protocol layer.
pub fn build_registry_packets() -> Vec<InternalPacket> {
    vec![
        registry("minecraft:dimension_type", vec![overworld_dimension()]),
        registry("minecraft:worldgen/biome", vec![plains_biome()]),
        registry("minecraft:chat_type", vec![chat_type()]),
        registry("minecraft:trim_pattern", vec![]),
        registry("minecraft:trim_material", vec![]),
        registry("minecraft:wolf_variant", vec![wolf_variant()]),
        registry("minecraft:painting_variant", vec![painting_variant()]),
        registry(
            "minecraft:damage_type",
            vec![
                damage_type("minecraft:generic", "generic"),
                damage_type("minecraft:generic_kill", "genericKill"),
            ],
        ),
        registry("minecraft:banner_pattern", vec![]),
        registry("minecraft:enchantment", vec![]),
        registry("minecraft:jukebox_song", vec![]),
    ]
}

fn registry(registry_id: &str, entries: Vec<RegistryEntry>) -> InternalPacket {
    InternalPacket::RegistryData {
        registry_id: registry_id.into(),
        entries,
    }
}

fn entry(id: &str, data: NbtValue) -> RegistryEntry {
    RegistryEntry {
        id: id.into(),
        data: Some(data),
    }
}

fn overworld_dimension() -> RegistryEntry {
    entry(
        "minecraft:overworld",
        NbtValue::compound([
            ("has_skylight", NbtValue::Byte(1)),
            ("has_ceiling", NbtValue::Byte(0)),
            ("ultrawarm", NbtValue::Byte(0)),
            ("natural", NbtValue::Byte(1)),
            ("coordinate_scale", NbtValue::Double(1.0)),
            ("bed_works", NbtValue::Byte(1)),
            ("respawn_anchor_works", NbtValue::Byte(0)),
            ("min_y", NbtValue::Int(-64)),
            ("height", NbtValue::Int(384)),
            ("logical_height", NbtValue::Int(384)),
            (
                "infiniburn",
                NbtValue::string("#minecraft:infiniburn_overworld"),
            ),
            ("effects", NbtValue::string("minecraft:overworld")),
            ("ambient_light", NbtValue::Float(0.0)),
            ("piglin_safe", NbtValue::Byte(0)),
            ("has_raids", NbtValue::Byte(1)),
            ("monster_spawn_light_level", NbtValue::Int(0)),
            ("monster_spawn_block_light_limit", NbtValue::Int(0)),
        ]),
    )
}

fn plains_biome() -> RegistryEntry {
    entry(
        "minecraft:plains",
        NbtValue::compound([
            ("has_precipitation", NbtValue::Byte(1)),
            ("temperature", NbtValue::Float(0.8)),
            ("downfall", NbtValue::Float(0.4)),
            (
                "effects",
                NbtValue::compound([
                    ("fog_color", NbtValue::Int(12638463)),
                    ("water_color", NbtValue::Int(4159204)),
                    ("water_fog_color", NbtValue::Int(329011)),
                    ("sky_color", NbtValue::Int(7907327)),
                    (
                        "mood_sound",
                        NbtValue::compound([
                            ("sound", NbtValue::string("minecraft:ambient.cave")),
                            ("tick_delay", NbtValue::Int(6000)),
                            ("offset", NbtValue::Double(2.0)),
                            ("block_search_extent", NbtValue::Int(8)),
                        ]),
                    ),
                ]),
            ),
        ]),
    )
}

fn chat_type() -> RegistryEntry {
    let decoration = |translation_key: &str| {
        NbtValue::compound([
            ("translation_key", NbtValue::string(translation_key)),
            (
                "parameters",
                NbtValue::list([NbtValue::string("sender"), NbtValue::string("content")]),
            ),
        ])
    };
    entry(
        "minecraft:chat",
        NbtValue::compound([
            ("chat", decoration("chat.type.text")),
            ("narration", decoration("chat.type.text.narrate")),
        ]),
    )
}

fn wolf_variant() -> RegistryEntry {
    entry(
        "minecraft:pale",
        NbtValue::compound([
            (
                "wild_texture",
                NbtValue::string("minecraft:textures/entity/wolf/wolf.png"),
            ),
            (
                "tame_texture",
                NbtValue::string("minecraft:textures/entity/wolf/wolf_tame.png"),
            ),
            (
                "angry_texture",
                NbtValue::string("minecraft:textures/entity/wolf/wolf_angry.png"),
            ),
            ("biomes", NbtValue::string("minecraft:plains")),
        ]),
    )
}

fn painting_variant() -> RegistryEntry {
    entry(
        "minecraft:kebab",
        NbtValue::compound([
            ("asset_id", NbtValue::string("minecraft:kebab")),
            ("width", NbtValue::Int(1)),
            ("height", NbtValue::Int(1)),
        ]),
    )
}

fn damage_type(id: &str, message_id: &str) -> RegistryEntry {
    entry(
        id,
        NbtValue::compound([
            ("message_id", NbtValue::string(message_id)),
            ("scaling", NbtValue::string("never")),
            ("exhaustion", NbtValue::Float(0.0)),
        ]),
    )
}
