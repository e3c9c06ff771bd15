use dealmap_core::RawRecord;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::{ProviderError, ProviderPage};

const ITEM_TAG: &str = "item";

/// Decode one provider XML page. `resultCode` must be `00` or `000`; every
/// `<item>` child element becomes one key of the raw record.
pub fn parse_trade_page(body: &[u8]) -> Result<ProviderPage, ProviderError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RawRecord> = None;
    let mut items = Vec::new();
    let mut result_code: Option<String> = None;
    let mut result_msg: Option<String> = None;
    let mut total_count: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == ITEM_TAG {
                    current = Some(RawRecord::new());
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                if let Some(record) = current.as_mut() {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    record.entry(name).or_default();
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|err| ProviderError::Decode(err.to_string()))?
                    .into_owned();
                if let Some(tag) = stack.last() {
                    match current.as_mut() {
                        Some(record) if tag != ITEM_TAG => {
                            record.entry(tag.clone()).or_default().push_str(&text);
                        }
                        Some(_) => {}
                        None => match tag.as_str() {
                            "resultCode" => result_code = Some(text),
                            "resultMsg" => result_msg = Some(text),
                            "totalCount" => total_count = Some(text),
                            _ => {}
                        },
                    }
                }
            }
            Ok(Event::End(_)) => {
                if stack.pop().as_deref() == Some(ITEM_TAG) {
                    if let Some(record) = current.take() {
                        items.push(record);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ProviderError::Decode(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let code = result_code.unwrap_or_default();
    if code != "00" && code != "000" {
        return Err(ProviderError::Upstream {
            code,
            message: result_msg.unwrap_or_else(|| "unknown provider error".to_string()),
        });
    }

    let total_count = total_count
        .map(|raw| raw.chars().filter(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0);

    Ok(ProviderPage { total_count, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<response>
  <header><resultCode>000</resultCode><resultMsg>OK</resultMsg></header>
  <body>
    <items>
      <item>
        <aptNm>Test Tower</aptNm>
        <umdNm>Daechi</umdNm>
        <dealAmount>  150,000</dealAmount>
        <dealYear>2026</dealYear><dealMonth>8</dealMonth><dealDay>14</dealDay>
        <excluUseAr>84.97</excluUseAr>
        <floor>12</floor>
        <buildYear/>
      </item>
      <item>
        <aptNm>A &amp; B</aptNm>
        <umdNm>Jamsil</umdNm>
      </item>
    </items>
    <numOfRows>1000</numOfRows>
    <pageNo>1</pageNo>
    <totalCount>2</totalCount>
  </body>
</response>"#;

    #[test]
    fn parses_items_and_total() {
        let page = parse_trade_page(PAGE.as_bytes()).unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.items.len(), 2);
        let first = &page.items[0];
        assert_eq!(first.get("aptNm").map(String::as_str), Some("Test Tower"));
        assert_eq!(first.get("dealAmount").map(String::as_str), Some("150,000"));
        assert_eq!(first.get("buildYear").map(String::as_str), Some(""));
        assert_eq!(page.items[1].get("aptNm").map(String::as_str), Some("A & B"));
    }

    #[test]
    fn non_success_result_code_is_upstream_error() {
        let xml = "<response><header><resultCode>30</resultCode>\
                   <resultMsg>SERVICE KEY IS NOT REGISTERED ERROR.</resultMsg></header></response>";
        match parse_trade_page(xml.as_bytes()) {
            Err(ProviderError::Upstream { code, message }) => {
                assert_eq!(code, "30");
                assert!(message.contains("SERVICE KEY"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_result_code_is_rejected() {
        assert!(matches!(
            parse_trade_page(b"<response><body/></response>"),
            Err(ProviderError::Upstream { .. })
        ));
    }

    #[test]
    fn legacy_korean_tags_are_kept_verbatim() {
        let xml = "<response><header><resultCode>00</resultCode></header><body><items>\
                   <item><아파트>래미안</아파트><거래금액>95,000</거래금액></item>\
                   </items><totalCount>1</totalCount></body></response>";
        let page = parse_trade_page(xml.as_bytes()).unwrap();
        assert_eq!(page.items[0].get("아파트").map(String::as_str), Some("래미안"));
    }
}
