//! Render sitemap entries as a sitemaps.org `urlset` document.

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::model::SitemapEntry;

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

pub fn write_urlset(entries: &[SitemapEntry]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
    ))?;

    for entry in entries {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        write_text_element(&mut writer, "loc", &entry.loc)?;
        if let Some(lastmod) = &entry.lastmod {
            write_text_element(&mut writer, "lastmod", lastmod)?;
        }
        if let Some(changefreq) = entry.changefreq {
            write_text_element(&mut writer, "changefreq", changefreq.as_str())?;
        }
        if let Some(priority) = entry.priority {
            write_text_element(&mut writer, "priority", &priority.to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;

    let mut xml = String::from_utf8(writer.into_inner()).context("sitemap XML is not UTF-8")?;
    xml.push('\n');
    Ok(xml)
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
