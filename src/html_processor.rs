//! HTML处理模块
//!
//! 提供HTML解析、站内链接改写和序列化功能

// 标准库导入
use std::collections::VecDeque;

// 第三方crate导入
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{NodeData, RcDom};
use tracing::debug;
use url::Url;

// 本地模块导入
use crate::error::Result;

/// 可能携带URL的属性
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "poster", "data-src"];

/// 解析HTML文档
pub fn parse_html(html: &str) -> Result<RcDom> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| crate::export_error!(transform, "relative_urls", format!("HTML解析失败: {:?}", e)))
}

/// 把指向站点自身的绝对URL改写为根相对URL
///
/// 只处理 `href`、`src`、`action`、`poster`、`data-src` 与 `srcset`；
/// 外部链接保持不变。空内容或不含标签的内容原样返回。
pub fn rewrite_site_urls(html: &str, site_url: &Url) -> Result<String> {
    if html.trim().is_empty() || !html.contains('<') {
        return Ok(html.to_string());
    }

    let dom = parse_html(html)?;
    let rewritten = rewrite_dom_urls(&dom, site_url);
    debug!("改写站内链接: {} 处", rewritten);

    serialize_dom_to_html(dom)
}

/// 遍历DOM并改写属性，返回改写数量
fn rewrite_dom_urls(dom: &RcDom, site_url: &Url) -> usize {
    let mut queue = VecDeque::new();
    let mut rewritten = 0;
    queue.push_back(dom.document.clone());

    while let Some(node) = queue.pop_front() {
        if let NodeData::Element { ref attrs, .. } = node.data {
            for attr in attrs.borrow_mut().iter_mut() {
                let attr_name = attr.name.local.as_ref();
                let new_value = if URL_ATTRIBUTES.contains(&attr_name) {
                    to_root_relative(&attr.value, site_url)
                } else if attr_name == "srcset" {
                    rewrite_srcset(&attr.value, site_url)
                } else {
                    None
                };

                if let Some(value) = new_value {
                    attr.value = value.into();
                    rewritten += 1;
                }
            }
        }

        for child in node.children.borrow().iter() {
            queue.push_back(child.clone());
        }
    }

    rewritten
}

/// 站内绝对URL转根相对URL，非站内地址返回None
pub fn to_root_relative(value: &str, site_url: &Url) -> Option<String> {
    let value = value.trim();
    let parsed = if value.starts_with("//") {
        Url::parse(&format!("{}:{}", site_url.scheme(), value)).ok()?
    } else {
        Url::parse(value).ok()?
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    if parsed.host_str() != site_url.host_str() || parsed.port() != site_url.port() {
        return None;
    }

    let mut result = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        result.push('?');
        result.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        result.push('#');
        result.push_str(fragment);
    }
    Some(result)
}

/// 改写 `srcset` 中的每个候选地址
fn rewrite_srcset(value: &str, site_url: &Url) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = value
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or("");
            let descriptor = parts.next();
            match to_root_relative(url, site_url) {
                Some(relative) => {
                    changed = true;
                    match descriptor {
                        Some(d) => format!("{} {}", relative, d.trim()),
                        None => relative,
                    }
                }
                None => candidate.to_string(),
            }
        })
        .collect();

    if changed {
        Some(candidates.join(", "))
    } else {
        None
    }
}

/// 序列化DOM为HTML字符串
pub fn serialize_dom_to_html(dom: RcDom) -> Result<String> {
    use html5ever::serialize::{serialize, SerializeOpts};
    use markup5ever_rcdom::SerializableHandle;
    use std::io::Cursor;

    let mut buffer = Vec::new();
    let cursor = Cursor::new(&mut buffer);

    serialize(
        cursor,
        &SerializableHandle::from(dom.document.clone()),
        SerializeOpts::default(),
    )
    .map_err(|e| anyhow::anyhow!("HTML序列化失败: {:?}", e))?;

    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("UTF-8转换失败: {}", e).into())
}
