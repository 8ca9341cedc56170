//! `hdrgm` XMP packets for the primary image and its gain map.

use crate::gainmap::GainMapMetadata;

pub const HDRGM_NAMESPACE: &str = "http://ns.adobe.com/hdr-gain-map/1.0/";
pub const CONTAINER_NAMESPACE: &str = "http://ns.google.com/photos/1.0/container/";
pub const ITEM_NAMESPACE: &str = "http://ns.google.com/photos/1.0/container/item/";

const PACKET_BEGIN: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#;
const PACKET_END: &str = r#"<?xpacket end="w"?>"#;

/// Where the gain map lives relative to the primary image.
#[derive(Debug, Clone, Copy)]
pub struct ContainerDirectory<'a> {
    pub mime: &'a str,
    /// Byte length of the appended gain-map image.
    pub gain_map_length: usize,
}

/// XMP for the primary image. JPEG output also lists the appended gain map in a container directory.
pub fn primary_xmp(directory: Option<ContainerDirectory<'_>>) -> String {
    let Some(directory) = directory else {
        return format!(
            r#"{PACKET_BEGIN}
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about=""
        xmlns:hdrgm="{HDRGM_NAMESPACE}"
        hdrgm:Version="1.0"/>
  </rdf:RDF>
</x:xmpmeta>
{PACKET_END}"#
        );
    };

    let ContainerDirectory { mime, gain_map_length } = directory;
    format!(
        r#"{PACKET_BEGIN}
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about=""
        xmlns:hdrgm="{HDRGM_NAMESPACE}"
        xmlns:Container="{CONTAINER_NAMESPACE}"
        xmlns:Item="{ITEM_NAMESPACE}"
        hdrgm:Version="1.0">
      <Container:Directory>
        <rdf:Seq>
          <rdf:li rdf:parseType="Resource">
            <Container:Item Item:Semantic="Primary" Item:Mime="{mime}"/>
          </rdf:li>
          <rdf:li rdf:parseType="Resource">
            <Container:Item Item:Semantic="GainMap" Item:Mime="{mime}" Item:Length="{gain_map_length}"/>
          </rdf:li>
        </rdf:Seq>
      </Container:Directory>
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
{PACKET_END}"#
    )
}

/// XMP for the gain-map image, carrying the parameters a viewer needs to apply it.
pub fn gain_map_xmp(metadata: &GainMapMetadata) -> String {
    let base_rendition_is_hdr = if metadata.base_rendition_is_hdr { "True" } else { "False" };
    format!(
        r#"{PACKET_BEGIN}
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about=""
        xmlns:hdrgm="{HDRGM_NAMESPACE}"
        hdrgm:Version="1.0"
        hdrgm:HDRCapacityMin="{hdr_capacity_min:.6}"
        hdrgm:HDRCapacityMax="{hdr_capacity_max:.6}"
        hdrgm:BaseRenditionIsHDR="{base_rendition_is_hdr}">
{gain_map_min}
{gain_map_max}
{gamma}
{offset_sdr}
{offset_hdr}
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
{PACKET_END}"#,
        hdr_capacity_min = metadata.hdr_capacity_min,
        hdr_capacity_max = metadata.hdr_capacity_max,
        gain_map_min = channel_values("GainMapMin", &metadata.gain_map_min),
        gain_map_max = channel_values("GainMapMax", &metadata.gain_map_max),
        gamma = channel_values("Gamma", &metadata.gamma),
        offset_sdr = channel_values("OffsetSDR", &metadata.offset_sdr),
        offset_hdr = channel_values("OffsetHDR", &metadata.offset_hdr),
    )
}

/// One element per property; equal channels collapse to a single value.
fn channel_values(name: &str, values: &[f32; 3]) -> String {
    if values[0] == values[1] && values[1] == values[2] {
        return format!("      <hdrgm:{name}>{}</hdrgm:{name}>", values[0]);
    }

    format!(
        "      <hdrgm:{name}>\n        <rdf:Seq><rdf:li>{}</rdf:li><rdf:li>{}</rdf:li><rdf:li>{}</rdf:li></rdf:Seq>\n      </hdrgm:{name}>",
        values[0], values[1], values[2],
    )
}
